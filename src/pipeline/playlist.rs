//! Sliding-window media playlist generation

use std::collections::BTreeSet;

/// Everything a playlist revision is derived from.
pub struct PlaylistContext<'a> {
    /// Configured target segment duration in seconds.
    pub target_duration_secs: f64,
    pub init_version: u32,
    /// `(index, media duration seconds)` for the window, oldest first.
    pub segments: &'a [(u64, f64)],
    /// Segment indices that start after a discontinuity.
    pub discontinuities: &'a BTreeSet<u64>,
}

/// Render the media playlist for the current window.
pub fn render_media_playlist(ctx: &PlaylistContext<'_>) -> String {
    let max_duration = ctx
        .segments
        .iter()
        .map(|(_, d)| *d)
        .fold(0.0f64, f64::max);
    let mut target = max_duration.ceil();
    if target < ctx.target_duration_secs {
        target = ctx.target_duration_secs.ceil();
    }

    let media_sequence = ctx.segments.first().map(|(i, _)| *i).unwrap_or(0);
    let map_line = format!("#EXT-X-MAP:URI=\"init.mp4?v={}\"\n", ctx.init_version);

    let mut output = String::new();
    output.push_str("#EXTM3U\n");
    output.push_str("#EXT-X-VERSION:7\n");
    output.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", target as u64));
    output.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", media_sequence));
    output.push_str(&map_line);

    for (index, duration) in ctx.segments {
        if ctx.discontinuities.contains(index) {
            output.push_str("#EXT-X-DISCONTINUITY\n");
            output.push_str(&map_line);
        }
        output.push_str(&format!("#EXTINF:{:.3},\n", duration));
        output.push_str(&format!("segment{}.m4s\n", index));
    }

    output
}
