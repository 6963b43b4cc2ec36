//! Fixed-size mixing lines
//!
//! All intermediate mixing storage is built from contiguous blocks of
//! `BUFFER_LINE_SIZE` floats. The size bounds the samples produced per mix
//! iteration as well as the largest resampler step the mixer permits.

/// Samples per mixing line. Larger values need more memory, smaller values
/// need more iterations per period.
pub const BUFFER_LINE_SIZE: usize = 1024;

/// One channel's worth of mixing storage for a single period.
pub type FloatBufferLine = [f32; BUFFER_LINE_SIZE];

/// A freshly zeroed mixing line.
#[inline]
pub const fn silent_line() -> FloatBufferLine {
    [0.0; BUFFER_LINE_SIZE]
}

/// Zero the first `count` samples of every line in `lines`.
#[inline]
pub fn clear_lines(lines: &mut [FloatBufferLine], count: usize) {
    let count = count.min(BUFFER_LINE_SIZE);
    for line in lines {
        line[..count].fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_lines() {
        let mut lines = [[1.0f32; BUFFER_LINE_SIZE]; 2];
        clear_lines(&mut lines, 16);
        assert_eq!(lines[0][..16], [0.0; 16]);
        assert_eq!(lines[0][16], 1.0);
        assert_eq!(lines[1][15], 0.0);
    }
}
