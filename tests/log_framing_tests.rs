use futures::io::Cursor;
use kubepulse::k8s::logs::{LogLineReader, MAX_LINE_BYTES};

fn reader(bytes: &[u8]) -> LogLineReader<Cursor<Vec<u8>>> {
    LogLineReader::new(Cursor::new(bytes.to_vec()))
}

#[test]
fn test_lines_are_framed_on_newlines() {
    tokio_test::block_on(async {
        let mut r = reader(b"first line\nsecond line\n");
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("first line"));
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("second line"));
        assert_eq!(r.next_line().await.unwrap(), None);
    });
}

#[test]
fn test_final_line_without_newline_is_delivered() {
    tokio_test::block_on(async {
        let mut r = reader(b"tail without newline");
        assert_eq!(
            r.next_line().await.unwrap().as_deref(),
            Some("tail without newline")
        );
        assert_eq!(r.next_line().await.unwrap(), None);
    });
}

#[test]
fn test_crlf_is_stripped() {
    tokio_test::block_on(async {
        let mut r = reader(b"windows style\r\nplain\n");
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("windows style"));
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("plain"));
    });
}

#[test]
fn test_oversized_line_is_capped_and_framing_survives() {
    tokio_test::block_on(async {
        let mut bytes = vec![b'x'; MAX_LINE_BYTES + 4096];
        bytes.push(b'\n');
        bytes.extend_from_slice(b"next\n");

        let mut r = reader(&bytes);
        let long = r.next_line().await.unwrap().unwrap();
        assert_eq!(long.len(), MAX_LINE_BYTES);
        // the overflow was discarded, not leaked into the next line
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("next"));
        assert_eq!(r.next_line().await.unwrap(), None);
    });
}

#[test]
fn test_empty_stream_ends_immediately() {
    tokio_test::block_on(async {
        let mut r = reader(b"");
        assert_eq!(r.next_line().await.unwrap(), None);
    });
}

#[test]
fn test_follow_and_previous_are_mutually_exclusive() {
    tokio_test::block_on(async {
        let config = kube::Config::new("http://127.0.0.1:8080".parse().unwrap());
        let client = kube::Client::try_from(config).expect("offline client");
        let streamer = kubepulse::k8s::logs::LogStreamer::new(
            &kubepulse::k8s::K8sClient::from_client(client, None),
        );

        let opts = kubepulse::k8s::logs::LogOptions {
            follow: true,
            previous: true,
            ..Default::default()
        };
        let err = streamer.stream("default", "web-0", &opts).await.err();
        assert!(matches!(
            err,
            Some(kubepulse::errors::Error::LogStream(_))
        ));
    });
}
