//! Frame demultiplexer behaviour across chunk boundaries

use deploywatch::runtime::frames::{demux, encode_frame, split_lines, FrameDemuxer, StreamKind};

fn decode_chunks(chunks: &[&[u8]]) -> String {
    let mut demuxer = FrameDemuxer::new();
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(&demuxer.push_text(chunk));
    }
    text.push_str(&demuxer.finish());
    text
}

#[test]
fn test_header_straddling_split_yields_line() {
    let bytes = encode_frame(StreamKind::Stdout, b"hello world\n");
    assert_eq!(bytes.len(), 20);

    let text = decode_chunks(&[&bytes[0..6], &bytes[6..20]]);
    let lines: Vec<&str> = split_lines(&text).collect();
    assert_eq!(lines, vec!["hello world"]);
}

#[test]
fn test_chunking_does_not_change_output() {
    let mut bytes = encode_frame(StreamKind::Stdout, b"step 1/3: pulling image\n");
    bytes.extend(encode_frame(StreamKind::Stderr, "warn: caché miss\n".as_bytes()));
    bytes.extend(encode_frame(StreamKind::Stdout, b"step 2/3: starting\r\n"));
    bytes.extend(encode_frame(StreamKind::Stdout, b""));
    bytes.extend(encode_frame(StreamKind::Stdout, b"listening on :8080\n"));
    let expected = demux(&bytes);

    for size in 1..=bytes.len() {
        let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
        assert_eq!(decode_chunks(&chunks), expected, "chunk size {}", size);
    }

    let lines: Vec<&str> = split_lines(&expected).collect();
    assert_eq!(
        lines,
        vec![
            "step 1/3: pulling image",
            "warn: caché miss",
            "step 2/3: starting",
            "listening on :8080",
        ]
    );
}

#[test]
fn test_tty_output_passes_through() {
    let text = decode_chunks(&[b"plain ", b"tty output\n"]);
    assert_eq!(text, "plain tty output\n");
}

#[test]
fn test_truncated_header_flushed_on_finish() {
    let mut bytes = encode_frame(StreamKind::Stdout, b"done\n");
    bytes.extend_from_slice(&[1, 0, 0]);

    let mut demuxer = FrameDemuxer::new();
    assert_eq!(demuxer.push_text(&bytes), "done\n");
    assert_eq!(demuxer.finish().as_bytes(), &[1, 0, 0]);
}
