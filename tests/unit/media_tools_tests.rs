/*!
 * Tests for media tool probe parsing and argument building
 */

use std::path::{Path, PathBuf};
use dualsub::media_tools::{build_inject_args, is_bitmap_codec, parse_probe_output, InjectMetadata, InjectRequest};

fn request(output: &str, make_default: bool, clear_default: Vec<usize>) -> InjectRequest {
    InjectRequest {
        source: PathBuf::from("/videos/movie.mkv"),
        output: PathBuf::from(output),
        merged_text: String::new(),
        metadata: InjectMetadata {
            language: "eng".to_string(),
            title: "merged-eng-rus".to_string(),
            make_default,
            clear_default,
            existing_subtitle_count: 3,
        },
    }
}

fn args_of(request: &InjectRequest) -> Vec<String> {
    build_inject_args(request, Path::new("/tmp/merged.srt"))
        .into_iter()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect()
}

/// Test probe output with absolute and relative stream positions
#[test]
fn test_parse_probe_output_withMixedStreams_shouldKeepPositions() {
    let json = r#"{"streams":[
        {"index":3,"codec_name":"subrip","tags":{"language":"rus"}},
        {"index":5,"codec_name":"ass","tags":{"language":"eng","title":"  Full  "}},
        {"index":6,"codec_name":"dvd_subtitle","tags":{"language":"eng"}}
    ]}"#;

    let streams = parse_probe_output(json).unwrap();

    assert_eq!(streams.iter().map(|s| s.index).collect::<Vec<_>>(), vec![3, 5, 6]);
    assert_eq!(streams.iter().map(|s| s.subtitle_position).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(streams[1].title.as_deref(), Some("Full"));
    assert!(!streams[0].is_default);
    assert!(streams[2].is_bitmap());
}

/// Test a stream without index makes the probe unusable
#[test]
fn test_parse_probe_output_withMissingIndex_shouldFail() {
    assert!(parse_probe_output(r#"{"streams":[{"codec_name":"subrip"}]}"#).is_err());
}

/// Test bitmap codec detection
#[test]
fn test_is_bitmap_codec_withKnownCodecs_shouldClassify() {
    assert!(is_bitmap_codec("hdmv_pgs_subtitle"));
    assert!(is_bitmap_codec("dvb_subtitle"));
    assert!(!is_bitmap_codec("subrip"));
    assert!(!is_bitmap_codec("mov_text"));
}

/// Test injection into Matroska keeps the srt codec
#[test]
fn test_build_inject_args_withMatroskaOutput_shouldUseSrtCodec() {
    let args = args_of(&request("/tmp/movie.mkv", false, Vec::new()));
    let joined = args.join(" ");

    assert!(joined.contains("-map 0 -map 1:0 -c copy -c:s:3 srt"));
    assert!(joined.contains("-metadata:s:s:3 title=merged-eng-rus"));
    assert!(!joined.contains("-disposition:s:0"));
    assert_eq!(args[args.len() - 3..], ["-disposition:s:3", "0", "/tmp/movie.mkv"]);
}

/// Test default flags of existing streams are cleared when the new stream becomes default
#[test]
fn test_build_inject_args_withDefaultStreams_shouldClearTheirFlags() {
    let joined = args_of(&request("/tmp/movie.mov", true, vec![0, 2])).join(" ");

    assert!(joined.contains("-c:s:3 mov_text"));
    assert!(joined.contains("-disposition:s:0 0 -disposition:s:2 0 -disposition:s:3 default"));
}
