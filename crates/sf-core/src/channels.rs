//! Channel layouts and speaker identities.

/// Identity of one output (or input) speaker channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    BackCenter,
    SideLeft,
    SideRight,
    /// Ambisonic bus channel by ACN index.
    Ambi(u8),
}

impl Channel {
    /// Short label used in logs and device descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::FrontLeft => "FL",
            Channel::FrontRight => "FR",
            Channel::FrontCenter => "FC",
            Channel::Lfe => "LFE",
            Channel::BackLeft => "BL",
            Channel::BackRight => "BR",
            Channel::BackCenter => "BC",
            Channel::SideLeft => "SL",
            Channel::SideRight => "SR",
            Channel::Ambi(_) => "AMBI",
        }
    }
}

/// Device or buffer channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelLayout {
    Mono,
    #[default]
    Stereo,
    Quad,
    X51,
    X51Rear,
    X61,
    X71,
    /// First-order ambisonic output (4 channels, ACN order).
    Ambi1,
    /// Second-order ambisonic output (9 channels).
    Ambi2,
    /// Third-order ambisonic output (16 channels).
    Ambi3,
}

impl ChannelLayout {
    /// Number of channels the layout carries.
    pub const fn count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Quad => 4,
            ChannelLayout::X51 | ChannelLayout::X51Rear => 6,
            ChannelLayout::X61 => 7,
            ChannelLayout::X71 => 8,
            ChannelLayout::Ambi1 => 4,
            ChannelLayout::Ambi2 => 9,
            ChannelLayout::Ambi3 => 16,
        }
    }

    /// Whether the layout is a raw ambisonic bus rather than speakers.
    pub const fn is_ambisonic(self) -> bool {
        matches!(
            self,
            ChannelLayout::Ambi1 | ChannelLayout::Ambi2 | ChannelLayout::Ambi3
        )
    }

    /// Ambisonic order for ambisonic layouts, 0 otherwise.
    pub const fn ambi_order(self) -> usize {
        match self {
            ChannelLayout::Ambi1 => 1,
            ChannelLayout::Ambi2 => 2,
            ChannelLayout::Ambi3 => 3,
            _ => 0,
        }
    }

    /// The speaker identities, in device channel order. Empty for ambisonic
    /// layouts.
    pub fn speakers(self) -> &'static [Channel] {
        use Channel::*;
        match self {
            ChannelLayout::Mono => &[FrontCenter],
            ChannelLayout::Stereo => &[FrontLeft, FrontRight],
            ChannelLayout::Quad => &[FrontLeft, FrontRight, BackLeft, BackRight],
            ChannelLayout::X51 => &[FrontLeft, FrontRight, FrontCenter, Lfe, SideLeft, SideRight],
            ChannelLayout::X51Rear => {
                &[FrontLeft, FrontRight, FrontCenter, Lfe, BackLeft, BackRight]
            }
            ChannelLayout::X61 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                Lfe,
                BackCenter,
                SideLeft,
                SideRight,
            ],
            ChannelLayout::X71 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                Lfe,
                BackLeft,
                BackRight,
                SideLeft,
                SideRight,
            ],
            _ => &[],
        }
    }

    /// Parse a config-file name (`stereo`, `surround51`, `ambi2`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mono" => Some(ChannelLayout::Mono),
            "stereo" => Some(ChannelLayout::Stereo),
            "quad" => Some(ChannelLayout::Quad),
            "surround51" => Some(ChannelLayout::X51),
            "surround51rear" => Some(ChannelLayout::X51Rear),
            "surround61" => Some(ChannelLayout::X61),
            "surround71" => Some(ChannelLayout::X71),
            "ambi1" => Some(ChannelLayout::Ambi1),
            "ambi2" => Some(ChannelLayout::Ambi2),
            "ambi3" => Some(ChannelLayout::Ambi3),
            _ => None,
        }
    }
}

/// Ambisonic channel ordering convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiLayout {
    /// Ambisonic Channel Number ordering.
    #[default]
    Acn,
    /// Legacy FuMa (WXYZ) ordering, first order only.
    Fuma,
}

/// Ambisonic normalisation convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiScaling {
    /// Schmidt semi-normalised.
    #[default]
    Sn3d,
    /// Fully normalised.
    N3d,
    /// Legacy FuMa gains, first order only.
    Fuma,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_counts() {
        assert_eq!(ChannelLayout::Mono.count(), 1);
        assert_eq!(ChannelLayout::X51.count(), 6);
        assert_eq!(ChannelLayout::X71.count(), 8);
        assert_eq!(ChannelLayout::Ambi3.count(), 16);
    }

    #[test]
    fn test_speaker_tables_match_counts() {
        for layout in [
            ChannelLayout::Mono,
            ChannelLayout::Stereo,
            ChannelLayout::Quad,
            ChannelLayout::X51,
            ChannelLayout::X51Rear,
            ChannelLayout::X61,
            ChannelLayout::X71,
        ] {
            assert_eq!(layout.speakers().len(), layout.count());
        }
        assert!(ChannelLayout::Ambi1.speakers().is_empty());
    }

    #[test]
    fn test_side_vs_rear_51() {
        assert!(ChannelLayout::X51.speakers().contains(&Channel::SideLeft));
        assert!(ChannelLayout::X51Rear.speakers().contains(&Channel::BackLeft));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(ChannelLayout::from_name("surround71"), Some(ChannelLayout::X71));
        assert_eq!(ChannelLayout::from_name("AMBI2"), Some(ChannelLayout::Ambi2));
        assert_eq!(ChannelLayout::from_name("octagonal"), None);
    }
}
