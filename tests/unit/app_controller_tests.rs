/*!
 * Tests for automatic upper/lower source selection
 */

use dualsub::app_controller::select_subtitle_source;
use dualsub::media_tools::StreamInfo;
use dualsub::merging::SubtitleSource;
use crate::common;

fn titled(index: usize, title: &str) -> SubtitleSource {
    SubtitleSource::embedded(StreamInfo {
        title: Some(title.to_string()),
        ..common::text_stream(index, index, None)
    })
}

/// Test a language tag match wins over an earlier title match
#[test]
fn test_select_subtitle_source_withTagAndTitle_shouldPreferTag() {
    let sources = vec![
        titled(0, "English (SDH)"),
        SubtitleSource::embedded(common::text_stream(1, 1, Some("eng"))),
    ];

    assert_eq!(select_subtitle_source(&sources, "en", None), Some(1));
}

/// Test titles naming the language or carrying the code are accepted
#[test]
fn test_select_subtitle_source_withTitlesOnly_shouldMatchNameOrCode() {
    let sources = vec![titled(0, "Commentary"), titled(1, "Russian forced")];
    assert_eq!(select_subtitle_source(&sources, "ru", None), Some(1));

    let sources = vec![titled(0, "Fr-CA"), titled(1, "ENG")];
    assert_eq!(select_subtitle_source(&sources, "eng", None), Some(1));

    // Code must be a whole word
    let sources = vec![titled(0, "Energetic")];
    assert_eq!(select_subtitle_source(&sources, "en", None), None);
}

/// Test a title is ignored when the stream is tagged with another language
#[test]
fn test_select_subtitle_source_withTitleOnOtherLanguageStream_shouldSkipIt() {
    let translated = SubtitleSource::embedded(StreamInfo {
        title: Some("French (from English)".to_string()),
        ..common::text_stream(0, 0, Some("fr"))
    });
    assert_eq!(select_subtitle_source(&[translated.clone()], "en", None), None);

    let undetermined = SubtitleSource::embedded(StreamInfo {
        title: Some("English".to_string()),
        ..common::text_stream(1, 1, Some("und"))
    });
    assert_eq!(select_subtitle_source(&[translated, undetermined], "en", None), Some(1));
}

/// Test bitmap streams are never selected
#[test]
fn test_select_subtitle_source_withBitmapStream_shouldSkipIt() {
    let sources = vec![
        SubtitleSource::embedded(common::bitmap_stream(0, 0, Some("en"))),
        SubtitleSource::embedded(common::text_stream(1, 1, Some("en"))),
    ];
    assert_eq!(select_subtitle_source(&sources, "en", None), Some(1));

    let only_bitmap = vec![SubtitleSource::embedded(common::bitmap_stream(0, 0, Some("en")))];
    assert_eq!(select_subtitle_source(&only_bitmap, "en", None), None);
}

/// Test the excluded index is skipped so upper and lower differ
#[test]
fn test_select_subtitle_source_withExclude_shouldPickNextMatch() {
    let sources = vec![
        SubtitleSource::embedded(common::text_stream(0, 0, Some("en"))),
        SubtitleSource::external("/v/movie.en.srt", Some("en".to_string()), "utf-8"),
    ];

    assert_eq!(select_subtitle_source(&sources, "en", Some(0)), Some(1));
    assert_eq!(select_subtitle_source(&sources, "ru", None), None);
}

/// Test discovery without inputs
#[test]
fn test_discover_withNoInputs_shouldReturnNoFiles() {
    use std::sync::Arc;
    use dualsub::app_config::Config;
    use dualsub::app_controller::Controller;
    use dualsub::merging::CancelFlag;
    use crate::common::mock_tools::{FixedFreeSpace, ScriptedTools};

    let controller = Controller::with_backends(
        Config::default(),
        Arc::new(ScriptedTools::new()),
        Arc::new(FixedFreeSpace::plenty()),
    );

    let files = tokio_test::block_on(controller.discover(&[], &CancelFlag::new())).unwrap();
    assert!(files.is_empty());
}
