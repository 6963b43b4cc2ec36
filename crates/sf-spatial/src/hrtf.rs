//! HRTF dataset store and lookup
//!
//! The in-memory store keeps impulse-response pairs grouped by distance
//! field, elevation, then azimuth. Lookup bilinearly blends the four IRs
//! around a direction, attenuated by the source's directional spread, and
//! returns per-ear coefficients plus onset delays.
//!
//! Datasets load from the little-endian `MinPHR` binary family: `MinPHR00`
//! and `MinPHR01` carry mono IRs mirrored onto the other ear, `MinPHR02`
//! adds multiple distance fields and optional stereo IRs.

use std::f32::consts::{PI, TAU};

use crate::error::{SpatialError, SpatialResult};

/// In-memory impulse-response length per ear.
pub const HRIR_LENGTH: usize = 128;
/// History samples a voice keeps for delayed HRTF mixing.
pub const HRTF_HISTORY_LENGTH: usize = 64;
/// Largest representable onset delay in samples.
pub const MAX_HRIR_DELAY: u8 = (HRTF_HISTORY_LENGTH - 1) as u8;
/// Smallest IR length a dataset may declare.
pub const MIN_IR_LENGTH: usize = 8;
/// Largest IR length a dataset may declare (stored truncated to
/// [`HRIR_LENGTH`]).
pub const MAX_IR_LENGTH: usize = 512;
/// Most distance fields a dataset may declare.
pub const MAX_FD_COUNT: usize = 16;

/// Interleaved left/right coefficients for one direction.
pub type HrirArray = [[f32; 2]; HRIR_LENGTH];

/// One distance field's elevation extent.
#[derive(Debug, Clone, Copy)]
pub struct HrtfField {
    /// Measurement distance in metres.
    pub distance: f32,
    /// Number of elevations in this field.
    pub ev_count: u8,
}

/// One elevation ring: how many azimuths it holds and where its IRs start.
#[derive(Debug, Clone, Copy)]
pub struct HrtfElevation {
    pub az_count: u16,
    pub ir_offset: u16,
}

/// Read-only HRTF dataset shared across a device's voices via `Arc`.
pub struct HrtfStore {
    sample_rate: u32,
    ir_size: usize,
    /// Fields stored farthest first.
    fields: Vec<HrtfField>,
    elev: Vec<HrtfElevation>,
    coeffs: Vec<HrirArray>,
    delays: Vec<[u8; 2]>,
}

struct IdxBlend {
    idx: usize,
    blend: f32,
}

/// Elevation index and blend factor for a polar elevation in radians,
/// covering -pi/2..pi/2 across `ev_count` steps.
fn calc_ev_index(ev_count: usize, ev: f32) -> IdxBlend {
    let ev = (PI * 0.5 + ev) * (ev_count - 1) as f32 / PI;
    let idx = (ev as usize).min(ev_count - 1);
    IdxBlend {
        idx,
        blend: ev - idx as f32,
    }
}

/// Azimuth index and blend factor for a polar azimuth in radians, wrapping
/// across `az_count` steps.
fn calc_az_index(az_count: usize, az: f32) -> IdxBlend {
    let az = (TAU + az) * az_count as f32 / TAU;
    let idx = az as usize;
    IdxBlend {
        idx: idx % az_count,
        blend: az - idx as f32,
    }
}

impl HrtfStore {
    /// Dataset sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Valid coefficients per IR.
    #[inline]
    pub fn ir_size(&self) -> usize {
        self.ir_size
    }

    /// Compute blended HRIR coefficients and delays for a direction.
    /// `elevation` and `azimuth` are polar radians, `distance` in metres
    /// selects the field, and `spread` (radians) fades toward diffuse.
    pub fn get_coeffs(
        &self,
        elevation: f32,
        azimuth: f32,
        distance: f32,
        spread: f32,
        coeffs: &mut HrirArray,
        delays: &mut [u32; 2],
    ) {
        let dirfact = 1.0 - spread / TAU;

        // Fields are farthest-first; walk until the source is inside one.
        let mut ebase = 0usize;
        let mut field_idx = 0usize;
        while field_idx + 1 < self.fields.len() && distance < self.fields[field_idx].distance {
            ebase += self.fields[field_idx].ev_count as usize;
            field_idx += 1;
        }
        let field = &self.fields[field_idx];

        let elev0 = calc_ev_index(field.ev_count as usize, elevation);
        let elev1_idx = (elev0.idx + 1).min(field.ev_count as usize - 1);
        let ir0_offset = self.elev[ebase + elev0.idx].ir_offset as usize;
        let ir1_offset = self.elev[ebase + elev1_idx].ir_offset as usize;

        let az0_count = self.elev[ebase + elev0.idx].az_count as usize;
        let az1_count = self.elev[ebase + elev1_idx].az_count as usize;
        let az0 = calc_az_index(az0_count, azimuth);
        let az1 = calc_az_index(az1_count, azimuth);

        // The four IRs around the direction.
        let idx = [
            ir0_offset + az0.idx,
            ir0_offset + (az0.idx + 1) % az0_count,
            ir1_offset + az1.idx,
            ir1_offset + (az1.idx + 1) % az1_count,
        ];

        // Bilinear weights, attenuated by the directional factor.
        let blend = [
            (1.0 - elev0.blend) * (1.0 - az0.blend) * dirfact,
            (1.0 - elev0.blend) * az0.blend * dirfact,
            elev0.blend * (1.0 - az1.blend) * dirfact,
            elev0.blend * az1.blend * dirfact,
        ];

        for ear in 0..2 {
            let d = self.delays[idx[0]][ear] as f32 * blend[0]
                + self.delays[idx[1]][ear] as f32 * blend[1]
                + self.delays[idx[2]][ear] as f32 * blend[2]
                + self.delays[idx[3]][ear] as f32 * blend[3];
            delays[ear] = (d + 0.5) as u32;
        }

        *coeffs = [[0.0; 2]; HRIR_LENGTH];
        for (c, &mult) in idx.iter().zip(blend.iter()) {
            if mult <= 0.0 {
                continue;
            }
            let src = &self.coeffs[*c];
            for i in 0..self.ir_size {
                coeffs[i][0] += src[i][0] * mult;
                coeffs[i][1] += src[i][1] * mult;
            }
        }
    }

    /// Build a synthetic dataset from a simple ITD/ILD head model, used
    /// when binaural output is requested without a measured dataset. 19
    /// elevation rings with azimuth counts thinning toward the poles.
    pub fn synthetic(sample_rate: u32) -> Self {
        const EV_COUNT: usize = 19;
        let ir_size = 32usize;

        let mut elev = Vec::with_capacity(EV_COUNT);
        let mut coeffs = Vec::new();
        let mut delays = Vec::new();

        for e in 0..EV_COUNT {
            let elevation = -90.0 + 180.0 * e as f32 / (EV_COUNT - 1) as f32;
            // Fewer azimuths near the poles.
            let az_count = ((elevation.to_radians().cos() * 24.0).round() as usize).max(1);
            elev.push(HrtfElevation {
                az_count: az_count as u16,
                ir_offset: coeffs.len() as u16,
            });

            for a in 0..az_count {
                let azimuth = TAU * a as f32 / az_count as f32;
                let (ir, delay) = synth_hrir(azimuth, elevation.to_radians(), sample_rate, ir_size);
                coeffs.push(ir);
                delays.push(delay);
            }
        }

        Self {
            sample_rate,
            ir_size,
            fields: vec![HrtfField {
                distance: 1.0,
                ev_count: EV_COUNT as u8,
            }],
            elev,
            coeffs,
            delays,
        }
    }

    /// Load a dataset from a `MinPHR00`/`01`/`02` byte stream.
    pub fn load(data: &[u8]) -> SpatialResult<Self> {
        let magic = data.get(..8).ok_or(SpatialError::TruncatedHrtf)?;
        let mut r = Reader {
            data,
            pos: 8,
        };
        let store = match magic {
            b"MinPHR00" => load_v0(&mut r),
            b"MinPHR01" => load_v1(&mut r),
            b"MinPHR02" => load_v2(&mut r),
            _ => Err(SpatialError::UnknownHrtfFormat),
        }?;
        log::debug!(
            "loaded HRTF dataset: {} Hz, {}-point IRs, {} field(s), {} direction(s)",
            store.sample_rate,
            store.ir_size,
            store.fields.len(),
            store.coeffs.len()
        );
        Ok(store)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> SpatialResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(SpatialError::TruncatedHrtf)?;
        let s = self
            .data
            .get(self.pos..end)
            .ok_or(SpatialError::TruncatedHrtf)?;
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> SpatialResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> SpatialResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> SpatialResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i16(&mut self) -> SpatialResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    fn i24(&mut self) -> SpatialResult<i32> {
        let b = self.take(3)?;
        let v = (b[0] as i32) | ((b[1] as i32) << 8) | ((b[2] as i8 as i32) << 16);
        Ok(v)
    }
}

fn check_ir_size(ir_size: usize) -> SpatialResult<usize> {
    if !(MIN_IR_LENGTH..=MAX_IR_LENGTH).contains(&ir_size) || ir_size % 2 != 0 {
        return Err(SpatialError::InvalidHrtf(format!(
            "IR length {ir_size} out of range"
        )));
    }
    Ok(ir_size.min(HRIR_LENGTH))
}

fn check_ev_count(ev_count: usize) -> SpatialResult<()> {
    if !(5..=181).contains(&ev_count) {
        return Err(SpatialError::InvalidHrtf(format!(
            "elevation count {ev_count} out of range"
        )));
    }
    Ok(())
}

fn check_az_count(az_count: usize) -> SpatialResult<()> {
    if !(1..=255).contains(&az_count) {
        return Err(SpatialError::InvalidHrtf(format!(
            "azimuth count {az_count} out of range"
        )));
    }
    Ok(())
}

fn check_delay(delay: u8) -> SpatialResult<u8> {
    if delay > MAX_HRIR_DELAY {
        return Err(SpatialError::InvalidHrtf(format!(
            "delay {delay} exceeds {MAX_HRIR_DELAY}"
        )));
    }
    Ok(delay)
}

/// One synthetic HRIR pair: interaural time difference from a spherical
/// head, level difference from a cosine pan law, and a soft one-pole
/// shadow on the far ear.
fn synth_hrir(azimuth: f32, elevation: f32, sample_rate: u32, ir_size: usize) -> (HrirArray, [u8; 2]) {
    const HEAD_RADIUS: f32 = 0.0875;
    const SPEED_OF_SOUND: f32 = 343.0;

    // Positive pan leans right. Woodworth ITD: r/c * (theta + sin theta)
    // with theta the lateral angle.
    let pan = azimuth.sin() * elevation.cos();
    let lateral = pan.clamp(-1.0, 1.0).asin().abs();
    let itd_seconds = (HEAD_RADIUS / SPEED_OF_SOUND) * (lateral + lateral.sin());
    let itd_samples = (itd_seconds * sample_rate as f32).min(MAX_HRIR_DELAY as f32 - 1.0);

    let left_gain = ((1.0 + pan) * 0.25 * std::f32::consts::PI).cos().abs();
    let right_gain = ((1.0 - pan) * 0.25 * std::f32::consts::PI).cos().abs();

    let mut ir = [[0.0f32; 2]; HRIR_LENGTH];
    // Gaussian-windowed impulse at the IR start.
    let sigma = 2.0f32;
    for (i, pair) in ir.iter_mut().enumerate().take(ir_size) {
        let t = i as f32;
        let pulse = (-t * t / (2.0 * sigma * sigma)).exp();
        pair[0] = left_gain * pulse;
        pair[1] = right_gain * pulse;
    }

    // Far-ear head shadow.
    let shadow = pan.abs() * 0.5;
    let far_ear = if pan > 0.0 { 0 } else { 1 };
    if shadow > 0.0 {
        let coeff = 0.5 * (1.0 - shadow);
        let mut state = 0.0f32;
        for pair in ir.iter_mut().take(ir_size) {
            state += (pair[far_ear] - state) * coeff;
            pair[far_ear] = state;
        }
    }

    let (l_delay, r_delay) = if pan > 0.0 {
        (itd_samples, 0.0)
    } else {
        (0.0, itd_samples)
    };
    (ir, [l_delay as u8, r_delay as u8])
}

/// Mirror mono (left-ear) IRs onto the right ear using the symmetric
/// azimuth.
fn mirror_left_hrirs(
    elev: &[HrtfElevation],
    coeffs: &mut [HrirArray],
    delays: &mut [[u8; 2]],
    ir_size: usize,
) {
    for e in elev {
        let base = e.ir_offset as usize;
        let az_count = e.az_count as usize;
        for az in 0..az_count {
            let mirror = (az_count - az) % az_count;
            let (l_idx, r_src) = (base + az, base + mirror);
            for i in 0..ir_size {
                coeffs[l_idx][i][1] = coeffs[r_src][i][0];
            }
            delays[l_idx][1] = delays[r_src][0];
        }
    }
}

fn load_v0(r: &mut Reader) -> SpatialResult<HrtfStore> {
    let rate = r.u32()?;
    let ir_count = r.u16()? as usize;
    let ir_size_raw = r.u16()? as usize;
    let ev_count = r.u8()? as usize;
    check_ev_count(ev_count)?;
    let ir_size = check_ir_size(ir_size_raw)?;

    let mut ev_offset = Vec::with_capacity(ev_count);
    for _ in 0..ev_count {
        ev_offset.push(r.u16()? as usize);
    }
    let mut elev = Vec::with_capacity(ev_count);
    for e in 0..ev_count {
        let next = if e + 1 < ev_count {
            ev_offset[e + 1]
        } else {
            ir_count
        };
        let az_count = next
            .checked_sub(ev_offset[e])
            .ok_or_else(|| SpatialError::InvalidHrtf("elevation offsets unordered".into()))?;
        check_az_count(az_count)?;
        elev.push(HrtfElevation {
            az_count: az_count as u16,
            ir_offset: ev_offset[e] as u16,
        });
    }

    let (coeffs, delays) = load_mono_irs(r, ir_count, ir_size_raw, ir_size)?;
    let mut store = HrtfStore {
        sample_rate: rate,
        ir_size,
        fields: vec![HrtfField {
            distance: 1.0,
            ev_count: ev_count as u8,
        }],
        elev,
        coeffs,
        delays,
    };
    mirror_left_hrirs(&store.elev.clone(), &mut store.coeffs, &mut store.delays, ir_size);
    Ok(store)
}

fn load_v1(r: &mut Reader) -> SpatialResult<HrtfStore> {
    let rate = r.u32()?;
    let ir_size_raw = r.u8()? as usize;
    let ev_count = r.u8()? as usize;
    check_ev_count(ev_count)?;
    let ir_size = check_ir_size(ir_size_raw)?;

    let mut elev = Vec::with_capacity(ev_count);
    let mut ir_total = 0usize;
    for _ in 0..ev_count {
        let az_count = r.u8()? as usize;
        check_az_count(az_count)?;
        elev.push(HrtfElevation {
            az_count: az_count as u16,
            ir_offset: ir_total as u16,
        });
        ir_total += az_count;
    }

    let (coeffs, delays) = load_mono_irs(r, ir_total, ir_size_raw, ir_size)?;
    let mut store = HrtfStore {
        sample_rate: rate,
        ir_size,
        fields: vec![HrtfField {
            distance: 1.0,
            ev_count: ev_count as u8,
        }],
        elev,
        coeffs,
        delays,
    };
    mirror_left_hrirs(&store.elev.clone(), &mut store.coeffs, &mut store.delays, ir_size);
    Ok(store)
}

fn load_mono_irs(
    r: &mut Reader,
    ir_count: usize,
    ir_size_raw: usize,
    ir_size: usize,
) -> SpatialResult<(Vec<HrirArray>, Vec<[u8; 2]>)> {
    let mut coeffs = vec![[[0.0f32; 2]; HRIR_LENGTH]; ir_count];
    for c in coeffs.iter_mut() {
        for i in 0..ir_size_raw {
            let v = r.i16()? as f32 / 32768.0;
            if i < ir_size {
                c[i][0] = v;
            }
        }
    }
    let mut delays = vec![[0u8; 2]; ir_count];
    for d in delays.iter_mut() {
        d[0] = check_delay(r.u8()?)?;
    }
    Ok((coeffs, delays))
}

fn load_v2(r: &mut Reader) -> SpatialResult<HrtfStore> {
    const SAMPLE_TYPE_S16: u8 = 0;
    const SAMPLE_TYPE_S24: u8 = 1;
    const CHAN_TYPE_MONO: u8 = 0;
    const CHAN_TYPE_STEREO: u8 = 1;

    let rate = r.u32()?;
    let sample_type = r.u8()?;
    let channel_type = r.u8()?;
    let ir_size_raw = r.u8()? as usize;
    let fd_count = r.u8()? as usize;

    if sample_type > SAMPLE_TYPE_S24 {
        return Err(SpatialError::InvalidHrtf(format!(
            "unknown sample type {sample_type}"
        )));
    }
    if channel_type > CHAN_TYPE_STEREO {
        return Err(SpatialError::InvalidHrtf(format!(
            "unknown channel type {channel_type}"
        )));
    }
    if fd_count == 0 || fd_count > MAX_FD_COUNT {
        return Err(SpatialError::InvalidHrtf(format!(
            "field count {fd_count} out of range"
        )));
    }
    let ir_size = check_ir_size(ir_size_raw)?;

    let mut fields = Vec::with_capacity(fd_count);
    let mut elev = Vec::new();
    let mut ir_total = 0usize;
    for _ in 0..fd_count {
        let distance_mm = r.u16()? as usize;
        if !(50..=2500).contains(&distance_mm) {
            return Err(SpatialError::InvalidHrtf(format!(
                "field distance {distance_mm}mm out of range"
            )));
        }
        let ev_count = r.u8()? as usize;
        check_ev_count(ev_count)?;
        fields.push(HrtfField {
            distance: distance_mm as f32 / 1000.0,
            ev_count: ev_count as u8,
        });
        for _ in 0..ev_count {
            let az_count = r.u8()? as usize;
            check_az_count(az_count)?;
            elev.push(HrtfElevation {
                az_count: az_count as u16,
                ir_offset: ir_total as u16,
            });
            ir_total += az_count;
        }
    }

    let channels = if channel_type == CHAN_TYPE_STEREO { 2 } else { 1 };
    let mut coeffs = vec![[[0.0f32; 2]; HRIR_LENGTH]; ir_total];
    for c in coeffs.iter_mut() {
        for i in 0..ir_size_raw {
            for ch in 0..channels {
                let v = match sample_type {
                    SAMPLE_TYPE_S16 => r.i16()? as f32 / 32768.0,
                    _ => r.i24()? as f32 / 8388608.0,
                };
                if i < ir_size {
                    c[i][ch] = v;
                }
            }
        }
    }
    let mut delays = vec![[0u8; 2]; ir_total];
    for d in delays.iter_mut() {
        for ch in 0..channels {
            d[ch] = check_delay(r.u8()?)?;
        }
    }

    let mut store = HrtfStore {
        sample_rate: rate,
        ir_size,
        fields,
        elev,
        coeffs,
        delays,
    };
    if channels == 1 {
        mirror_left_hrirs(&store.elev.clone(), &mut store.coeffs, &mut store.delays, ir_size);
    }

    // The file stores fields nearest first; lookup walks farthest first.
    if store
        .fields
        .windows(2)
        .any(|w| w[0].distance < w[1].distance)
    {
        reverse_fields(&mut store);
    }
    Ok(store)
}

/// Reorder fields (and their elevation/IR blocks) farthest-first.
fn reverse_fields(store: &mut HrtfStore) {
    let mut new_fields = Vec::with_capacity(store.fields.len());
    let mut new_elev = Vec::with_capacity(store.elev.len());
    let mut new_coeffs = Vec::with_capacity(store.coeffs.len());
    let mut new_delays = Vec::with_capacity(store.delays.len());

    // Elevation spans per field, in original order.
    let mut spans = Vec::with_capacity(store.fields.len());
    let mut ebase = 0usize;
    for f in &store.fields {
        spans.push(ebase..ebase + f.ev_count as usize);
        ebase += f.ev_count as usize;
    }

    for (field, span) in store.fields.iter().zip(spans.iter()).rev() {
        new_fields.push(*field);
        for e in span.clone() {
            let old = store.elev[e];
            let new_offset = new_coeffs.len();
            for i in 0..old.az_count as usize {
                new_coeffs.push(store.coeffs[old.ir_offset as usize + i]);
                new_delays.push(store.delays[old.ir_offset as usize + i]);
            }
            new_elev.push(HrtfElevation {
                az_count: old.az_count,
                ir_offset: new_offset as u16,
            });
        }
    }

    store.fields = new_fields;
    store.elev = new_elev;
    store.coeffs = new_coeffs;
    store.delays = new_delays;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal MinPHR01 dataset: 5 elevations, 1 azimuth each, with
    /// a recognisable impulse per direction.
    fn make_v1() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"MinPHR01");
        data.extend_from_slice(&44100u32.to_le_bytes());
        data.push(8); // irSize
        data.push(5); // evCount
        for _ in 0..5 {
            data.push(1); // azCount
        }
        // 5 IRs of 8 samples, impulse scaled by direction index.
        for dir in 0..5i16 {
            for i in 0..8i16 {
                let v = if i == 0 { (dir + 1) * 4096 } else { 0 };
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        // 5 delays.
        for dir in 0..5u8 {
            data.push(dir);
        }
        data
    }

    #[test]
    fn test_load_v1() {
        let store = HrtfStore::load(&make_v1()).unwrap();
        assert_eq!(store.sample_rate(), 44100);
        assert_eq!(store.ir_size(), 8);
        assert_eq!(store.fields.len(), 1);
        assert_eq!(store.elev.len(), 5);
    }

    #[test]
    fn test_unknown_magic() {
        let mut data = make_v1();
        data[7] = b'9';
        assert!(matches!(
            HrtfStore::load(&data),
            Err(SpatialError::UnknownHrtfFormat)
        ));
    }

    #[test]
    fn test_truncated() {
        let data = make_v1();
        assert!(matches!(
            HrtfStore::load(&data[..20]),
            Err(SpatialError::TruncatedHrtf)
        ));
    }

    #[test]
    fn test_get_coeffs_blends_elevations() {
        let store = HrtfStore::load(&make_v1()).unwrap();
        let mut coeffs = [[0.0f32; 2]; HRIR_LENGTH];
        let mut delays = [0u32; 2];

        // Straight ahead (elevation 0) sits between elevation rings 2 and 3
        // exactly at ring 2 (5 rings spanning -90..90: step 45 degrees).
        store.get_coeffs(0.0, 0.0, 1.0, 0.0, &mut coeffs, &mut delays);
        let expect = 3.0 * 4096.0 / 32768.0;
        assert!((coeffs[0][0] - expect).abs() < 1e-3, "{}", coeffs[0][0]);
        assert_eq!(delays[0], 2);
    }

    #[test]
    fn test_spread_fades_coeffs() {
        let store = HrtfStore::load(&make_v1()).unwrap();
        let mut coeffs = [[0.0f32; 2]; HRIR_LENGTH];
        let mut delays = [0u32; 2];
        store.get_coeffs(0.0, 0.0, 1.0, TAU, &mut coeffs, &mut delays);
        assert_eq!(coeffs[0][0], 0.0);
    }

    #[test]
    fn test_v2_field_count_bound() {
        let mut data = Vec::new();
        data.extend_from_slice(b"MinPHR02");
        data.extend_from_slice(&48000u32.to_le_bytes());
        data.push(0); // 16-bit samples
        data.push(0); // mono
        data.push(32); // IR length
        data.push((MAX_FD_COUNT + 1) as u8);
        assert!(HrtfStore::load(&data).is_err());
    }

    #[test]
    fn test_synthetic_store() {
        let store = HrtfStore::synthetic(48000);
        assert_eq!(store.sample_rate(), 48000);
        assert!(store.ir_size() >= MIN_IR_LENGTH);

        let mut coeffs = [[0.0f32; 2]; HRIR_LENGTH];
        let mut delays = [0u32; 2];
        // A source on the right: the left ear is delayed and quieter.
        store.get_coeffs(0.0, std::f32::consts::FRAC_PI_2, 1.0, 0.0, &mut coeffs, &mut delays);
        let l_energy: f32 = coeffs.iter().map(|p| p[0] * p[0]).sum();
        let r_energy: f32 = coeffs.iter().map(|p| p[1] * p[1]).sum();
        assert!(r_energy > l_energy, "right {r_energy} left {l_energy}");
        assert!(delays[0] >= delays[1]);
    }

    #[test]
    fn test_delay_bound_enforced() {
        let mut data = make_v1();
        let len = data.len();
        data[len - 1] = 64; // > MAX_HRIR_DELAY
        assert!(HrtfStore::load(&data).is_err());
    }
}
