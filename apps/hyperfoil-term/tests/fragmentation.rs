use hyperfoil_term_core::client::effect::{Download, DownloadSource, Effect};
use hyperfoil_term_core::client::output::ansi_to_html_lines;
use hyperfoil_term_core::client::{ClientSession, ModeKind, SessionOptions, UploadStage};
use hyperfoil_term_core::protocol::Frame;
use hyperfoil_term_core::protocol::sentinel::{
    BENCHMARK_END_OF_FILES, BENCHMARK_FILE_LIST, DIRECT_DOWNLOAD_END, DIRECT_DOWNLOAD_MAGIC,
};
use proptest::prelude::*;

/// Splits `text` at the given cut points (taken modulo its length and moved
/// back to a char boundary). Never yields empty pieces.
fn fragment(text: &str, cuts: &[usize]) -> Vec<String> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|cut| {
            let mut at = cut % (text.len() + 1);
            while !text.is_char_boundary(at) {
                at -= 1;
            }
            at
        })
        .collect();
    points.push(0);
    points.push(text.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|pair| text[pair[0]..pair[1]].to_string())
        .collect()
}

fn open_session() -> ClientSession {
    let mut client = ClientSession::new(SessionOptions::default());
    client.connection_opened();
    client
}

fn terminal_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            4 => "[a-z $>]{1,6}",
            2 => Just("\n".to_string()),
            1 => Just("\u{1b}[31m".to_string()),
            1 => Just("\u{1b}[1m".to_string()),
            1 => Just("\u{1b}[38;5;208m".to_string()),
            1 => Just("\u{1b}[0m".to_string()),
            1 => Just("ü→".to_string()),
        ],
        1..24,
    )
    .prop_map(|pieces| pieces.concat())
}

proptest! {
    #[test]
    fn output_is_independent_of_chunking(
        text in terminal_text(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let mut client = ClientSession::new(SessionOptions::default());
        for chunk in fragment(&text, &cuts) {
            client.handle_frame(Frame::Text(chunk));
        }
        prop_assert_eq!(client.transcript().html_lines(), ansi_to_html_lines(&text));
        prop_assert_eq!(client.mode_kind(), ModeKind::Idle);
    }

    #[test]
    fn file_list_is_independent_of_chunking(
        benchmark in "[a-z][a-z0-9-]{0,10}",
        version in "[a-z0-9]{0,6}",
        files in prop::collection::vec("[a-z]{1,8}\\.(csv|txt)", 1..5),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let mut client = open_session();
        let body = format!("{benchmark}\n{version}\n{}\n{BENCHMARK_END_OF_FILES}", files.join("\n"));
        let pieces = fragment(&body, &cuts);
        let (first, rest) = pieces.split_first().expect("non-empty body");
        client.handle_frame(Frame::Text(format!("{BENCHMARK_FILE_LIST}{first}")));
        for piece in rest {
            prop_assert_eq!(client.mode_kind(), ModeKind::ReceivingFileList);
            client.handle_frame(Frame::Text(piece.clone()));
        }

        prop_assert_eq!(client.mode_kind(), ModeKind::Idle);
        prop_assert_eq!(client.upload_stage(), UploadStage::AttachFiles);
        let upload = client.pending_upload().expect("pending upload");
        let slots: Vec<String> = upload.slots().into_iter().map(|slot| slot.name).collect();
        prop_assert_eq!(slots, files);
        prop_assert_eq!(upload.benchmark(), Some(benchmark.as_str()));
        prop_assert_eq!(upload.version(), (!version.is_empty()).then_some(version.as_str()));
    }

    #[test]
    fn download_is_independent_of_chunking(
        payload in prop::collection::vec(any::<u8>(), 0..256),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
        insert_at in any::<usize>(),
    ) {
        let mut client = open_session();
        let tail = format!("report.json\n{DIRECT_DOWNLOAD_END}");
        let pieces = fragment(&tail, &cuts);
        let binary_before = insert_at % pieces.len();

        let mut effects = client.handle_frame(Frame::Text(DIRECT_DOWNLOAD_MAGIC.to_string()));
        for (idx, piece) in pieces.into_iter().enumerate() {
            if idx == binary_before {
                effects.extend(client.handle_frame(Frame::Binary(payload.clone())));
            }
            effects.extend(client.handle_frame(Frame::Text(piece)));
        }

        let downloads: Vec<&Download> = effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Download(download) => Some(download),
                _ => None,
            })
            .collect();
        prop_assert_eq!(downloads.len(), 1);
        prop_assert_eq!(downloads[0].filename.as_str(), "report.json");
        prop_assert_eq!(&downloads[0].source, &DownloadSource::Inline(payload));
        prop_assert_eq!(client.mode_kind(), ModeKind::Idle);
    }
}

#[test]
fn fragment_covers_the_whole_text() {
    let pieces = fragment("añb", &[2, 1, 7]);
    assert_eq!(pieces.concat(), "añb");
    assert!(pieces.iter().all(|piece| !piece.is_empty()));
}
