//! Elementary stream kinds

use serde::{Deserialize, Serialize};

/// Kind of elementary stream carried by a container
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    Teletext,
    /// Auxiliary data such as radio data system payloads
    AuxData,
    /// Side-channel metadata such as ID3 tags
    SideChannel,
}

impl StreamType {
    /// All stream types in routing priority order
    pub const ALL: [StreamType; 6] = [
        StreamType::Video,
        StreamType::Audio,
        StreamType::Subtitle,
        StreamType::Teletext,
        StreamType::AuxData,
        StreamType::SideChannel,
    ];

    /// Dense index usable for per-type arrays
    pub fn index(self) -> usize {
        match self {
            StreamType::Video => 0,
            StreamType::Audio => 1,
            StreamType::Subtitle => 2,
            StreamType::Teletext => 3,
            StreamType::AuxData => 4,
            StreamType::SideChannel => 5,
        }
    }

    /// Audio or video, the two types that take part in clock synchronization
    pub fn is_av(self) -> bool {
        matches!(self, StreamType::Video | StreamType::Audio)
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Video => write!(f, "video"),
            StreamType::Audio => write!(f, "audio"),
            StreamType::Subtitle => write!(f, "subtitle"),
            StreamType::Teletext => write!(f, "teletext"),
            StreamType::AuxData => write!(f, "aux_data"),
            StreamType::SideChannel => write!(f, "side_channel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_dense_and_unique() {
        let mut seen = [false; 6];
        for t in StreamType::ALL {
            assert!(!seen[t.index()]);
            seen[t.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_serde_names_match_display() {
        for t in StreamType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t));
        }
    }
}
