//! Start-of-stream gate and scene-skip filtering
//!
//! After a seek every cursor carries a start gate (`startpts`). Packets in
//! front of the gate are dropped until the stream reaches the seek target.
//! Once a stream is inited, EDL regions decide whether its packets are
//! presented, decoded silently or muted.

use super::cursor::{CurrentStream, Cursors};
use super::edl::EditDecisionList;
use crate::collaborators::DemuxPacket;
use avlock_common::timing::time_to_msec;
use avlock_common::{StreamType, Timestamp};
use tracing::{debug, info};

/// Whether a packet may pass the start gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Drop,
}

/// Check `packet` against the start gate of `stream_type`
///
/// A packet with a known dts at or after the gate inits the cursor. When the
/// gate lies more than `abandon_after` ahead of the packet, every gated
/// cursor is reset to the packet's dts.
pub fn check_player_init(
    cursors: &mut Cursors,
    stream_type: StreamType,
    packet: &DemuxPacket,
    abandon_after: Timestamp,
) -> GateVerdict {
    let cursor = cursors.get_mut(stream_type);
    if cursor.inited {
        return GateVerdict::Pass;
    }

    if let Some(startpts) = cursor.startpts {
        let Some(dts) = packet.dts else {
            if !cursor.gate_drop_logged {
                debug!("{} packet without dts before start gate, dropping", stream_type);
                cursor.gate_drop_logged = true;
            }
            return GateVerdict::Drop;
        };

        if startpts - dts > abandon_after {
            info!(
                "{} gate {}ms is {}ms ahead of stream, abandoning start gates",
                stream_type,
                time_to_msec(startpts),
                time_to_msec(startpts - dts)
            );
            for gated in cursors.iter_mut().filter(|c| c.startpts.is_some()) {
                gated.startpts = Some(dts);
            }
        }

        let cursor = cursors.get_mut(stream_type);
        if let Some(startpts) = cursor.startpts.filter(|start| dts < *start) {
            if !cursor.gate_drop_logged {
                debug!(
                    "{} dropping packets before start gate: dts {}us, gate {}us",
                    stream_type, dts, startpts
                );
                cursor.gate_drop_logged = true;
            }
            return GateVerdict::Drop;
        }
    }

    let cursor = cursors.get_mut(stream_type);
    if let Some(dts) = packet.dts {
        debug!("{} stream inited at {}us", stream_type, dts);
        cursor.inited = true;
        cursor.startpts = Some(dts);
    }
    GateVerdict::Pass
}

/// How a packet that passed the gate is forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneDisposition {
    /// Decode without presenting (inside a cut)
    pub drop: bool,
    /// Silence audio output (inside a mute region)
    pub mute: bool,
}

/// Evaluate EDL regions at the cursor's current dts
///
/// `offset` is the running continuity offset; EDL times refer to the
/// uncorrected media timeline.
pub fn scene_disposition(cursor: &CurrentStream, edl: &EditDecisionList, offset: Timestamp) -> SceneDisposition {
    let Some(dts) = cursor.dts else {
        return SceneDisposition::default();
    };
    let time_ms = time_to_msec(dts + offset);
    SceneDisposition {
        drop: cursor.inited && edl.in_cut(time_ms),
        mute: cursor.stream_type == StreamType::Audio && edl.in_mute(time_ms),
    }
}
