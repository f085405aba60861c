//! Interfaces of the external collaborators driven by the engine
//!
//! The engine never demultiplexes, decodes or renders. It talks to:
//! - an [`InputStream`] (file, network or disc source)
//! - a [`DemuxerFactory`] building [`Demuxer`]s for the input and for
//!   external subtitle files, plus an optional [`CaptionDemuxer`]
//! - one [`StreamPlayer`] pipeline per stream type, grouped in a [`PipelineSet`]
//!
//! All collaborator calls made by the control thread are non-blocking except
//! demuxer reads and seeks.

pub mod demuxer;
pub mod input;
pub mod pipeline;

pub use demuxer::{CaptionDemuxer, DemuxPacket, DemuxRead, Demuxer, DemuxerFactory, StreamInfo};
pub use input::{CacheStatus, DisplayTime, InputStream, MenuNavigator, MenuType, NextStream};
pub use pipeline::{PipelineMessage, PipelineSet, StreamHint, StreamPlayer};
