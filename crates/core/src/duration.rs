use std::path::Path;
use std::sync::Arc;
use log::{debug, info, warn};
use crate::error::{MediaError, MediaResult};
use crate::ffprobe::{FFProbeData, MediaProber, StreamSelector};
use crate::process::parse_clock;

/// Strategy that produced a duration, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationStrategy {
    FormatField,
    Tag,
    StreamTimeBase,
    FrameCount,
    PacketScan,
}

/// Resolves a media file's playable duration through a chain of fallback probes
pub struct DurationResolver {
    prober: Arc<dyn MediaProber>,
}

impl DurationResolver {
    pub fn new(prober: Arc<dyn MediaProber>) -> Self {
        DurationResolver { prober }
    }

    /// Duration in seconds, 0 when no strategy can determine it
    ///
    /// Only fails with `ToolUnavailable`.
    pub async fn resolve_duration(&self, path: &Path) -> MediaResult<f64> {
        match self.prober.probe(path).await {
            Ok(data) => {
                if let Some((strategy, secs)) = duration_from_metadata(&data) {
                    debug!("Duration of {}: {:.3}s via {:?}", path.display(), secs, strategy);
                    return Ok(secs);
                }
                debug!("No metadata duration for {}, scanning packets", path.display());
            }
            Err(e @ MediaError::ToolUnavailable(_)) => return Err(e),
            Err(e) => {
                warn!("Metadata probe failed for {}: {}", path.display(), e);
            }
        }

        match self.packet_scan(path).await {
            Ok(secs) if accepted(secs) => {
                info!("Duration of {}: {:.3}s via {:?}", path.display(), secs, DurationStrategy::PacketScan);
                Ok(secs)
            }
            Ok(_) => {
                warn!("Could not determine duration of {}", path.display());
                Ok(0.0)
            }
            Err(e @ MediaError::ToolUnavailable(_)) => Err(e),
            Err(e) => {
                warn!("Packet scan failed for {}: {}", path.display(), e);
                Ok(0.0)
            }
        }
    }

    async fn packet_scan(&self, path: &Path) -> MediaResult<f64> {
        let audio = self.stream_max_pts(path, StreamSelector::FirstAudio).await?;
        if audio > 0.0 {
            return Ok(audio);
        }
        let video = self.stream_max_pts(path, StreamSelector::FirstVideo).await?;
        Ok(audio.max(video))
    }

    async fn stream_max_pts(&self, path: &Path, stream: StreamSelector) -> MediaResult<f64> {
        match self.prober.packet_timestamps(path, stream).await {
            Ok(packets) => Ok(packets.max_pts_time()),
            Err(e @ MediaError::ToolUnavailable(_)) => Err(e),
            Err(e) => {
                debug!("Packet scan of {} for {:?} failed: {}", path.display(), stream, e);
                Ok(0.0)
            }
        }
    }
}

/// Try the metadata strategies in order; the first accepted value wins
pub fn duration_from_metadata(data: &FFProbeData) -> Option<(DurationStrategy, f64)> {
    let strategies: [(DurationStrategy, fn(&FFProbeData) -> Option<f64>); 4] = [
        (DurationStrategy::FormatField, format_duration),
        (DurationStrategy::Tag, tag_duration),
        (DurationStrategy::StreamTimeBase, stream_time_base_duration),
        (DurationStrategy::FrameCount, frame_count_duration),
    ];

    strategies.iter().find_map(|(strategy, run)| {
        run(data).filter(|secs| accepted(*secs)).map(|secs| (*strategy, secs))
    })
}

fn accepted(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

fn format_duration(data: &FFProbeData) -> Option<f64> {
    data.format.duration.as_deref()?.trim().parse::<f64>().ok()
}

fn tag_duration(data: &FFProbeData) -> Option<f64> {
    let tag_sets = std::iter::once(data.format.tags.as_ref())
        .chain(data.streams.iter().map(|s| s.tags.as_ref()))
        .flatten();

    tag_sets
        .flat_map(|tags| ["DURATION", "duration"].into_iter().filter_map(move |key| tags.get(key)))
        .filter_map(|value| parse_clock(value))
        .reduce(f64::max)
}

fn stream_time_base_duration(data: &FFProbeData) -> Option<f64> {
    data.streams
        .iter()
        .filter_map(|s| {
            let ticks = s.duration_ts?;
            let time_base = parse_rational(s.time_base.as_deref()?)?;
            Some(ticks as f64 * time_base)
        })
        .reduce(f64::max)
}

fn frame_count_duration(data: &FFProbeData) -> Option<f64> {
    data.streams
        .iter()
        .filter_map(|s| {
            let frames = s.nb_frames.as_deref()?.trim().parse::<f64>().ok()?;
            let fps = parse_rational(s.avg_frame_rate.as_deref()?)?;
            if fps == 0.0 {
                return None;
            }
            Some(frames / fps)
        })
        .reduce(f64::max)
}

/// Parse a rational like "30000/1001"; a zero denominator yields None
pub fn parse_rational(value: &str) -> Option<f64> {
    let value = value.trim();
    let Some((num, den)) = value.split_once('/') else {
        return value.parse::<f64>().ok().filter(|v| v.is_finite());
    };

    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den).filter(|v| v.is_finite())
}
