//! Argument templates for the external ffmpeg workers.

use std::path::Path;

/// Target duration of one HLS segment, in seconds.
const HLS_SEGMENT_SECONDS: u32 = 2;

/// Encode the live stream into a rolling HLS playlist. Expired segments are
/// deleted by ffmpeg itself.
pub fn hls_args(source: &str, playlist: &Path, list_size: u32) -> Vec<String> {
    let segment_seconds = HLS_SEGMENT_SECONDS.to_string();
    let list_size = list_size.to_string();
    let playlist = playlist.to_string_lossy();

    #[rustfmt::skip]
    let args = [
        "-i", source,
        "-c:v", "libx264",
        "-preset", "veryfast",
        "-tune", "zerolatency",
        "-c:a", "aac",
        "-ar", "44100",
        "-f", "hls",
        "-hls_time", segment_seconds.as_str(),
        "-hls_list_size", list_size.as_str(),
        "-hls_flags", "delete_segments",
        &*playlist,
    ];
    args.iter().map(|arg| arg.to_string()).collect()
}

/// Relay the stream to a broadcast endpoint without re-encoding.
pub fn relay_args(source: &str, target_url: &str) -> Vec<String> {
    ["-i", source, "-c", "copy", "-f", "flv", target_url]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_template() {
        let args = hls_args(
            "rtmp://localhost:1935/live/x",
            Path::new("media/live/x/index.m3u8"),
            5,
        );
        assert_eq!(args[..2], ["-i", "rtmp://localhost:1935/live/x"]);
        let window = args.iter().position(|a| a == "-hls_list_size").unwrap();
        assert_eq!(args[window + 1], "5");
        assert!(args.windows(2).any(|w| w == ["-hls_flags", "delete_segments"]));
        assert_eq!(args.last().unwrap(), "media/live/x/index.m3u8");
    }

    #[test]
    fn relay_template_copies_codecs() {
        assert_eq!(
            relay_args("rtmp://localhost:1935/live/x", "rtmp://host/app/key"),
            [
                "-i",
                "rtmp://localhost:1935/live/x",
                "-c",
                "copy",
                "-f",
                "flv",
                "rtmp://host/app/key"
            ]
        );
    }
}
