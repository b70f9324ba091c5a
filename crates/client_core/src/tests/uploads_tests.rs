use super::*;

fn file(name: &str) -> SelectedFile {
    SelectedFile::from_bytes(name, b"%PDF-1.4".to_vec())
}

fn names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}-{i}.pdf")).collect()
}

#[test]
fn rejects_new_file_when_user_is_at_limit() {
    let mut queue = UploadQueue::new();
    let outcome = queue
        .select(&names("doc", 10), vec![file("new.pdf")])
        .expect("select");

    assert!(outcome.accepted.is_empty());
    assert_eq!(
        outcome.notice(),
        Some("You can upload maximum 10 documents. Remove some to add more.")
    );
    assert!(queue.selected().is_empty());
}

#[test]
fn accepts_only_the_remaining_capacity() {
    let mut queue = UploadQueue::new();
    let outcome = queue
        .select(&names("doc", 9), vec![file("a.pdf"), file("b.pdf")])
        .expect("select");

    assert_eq!(outcome.accepted, vec!["a.pdf".to_string()]);
    assert_eq!(
        outcome.rejections,
        vec!["Only 1 more document(s) can be added. Max limit is 10.".to_string()]
    );
    assert_eq!(queue.selected_names(), vec!["a.pdf".to_string()]);
}

#[test]
fn selected_files_count_toward_the_limit() {
    let mut queue = UploadQueue::new();
    queue
        .select(&names("doc", 8), vec![file("a.pdf")])
        .expect("first");
    let outcome = queue
        .select(&names("doc", 8), vec![file("b.pdf"), file("c.pdf")])
        .expect("second");
    assert_eq!(outcome.accepted, vec!["b.pdf".to_string()]);
    assert_eq!(queue.selected().len(), 2);
}

#[test]
fn rejects_duplicates_and_oversized_files_with_first_message_surfaced() {
    let mut queue = UploadQueue::new();
    queue.select(&[], vec![file("a.pdf")]).expect("seed");

    let huge = SelectedFile {
        name: "huge.pdf".into(),
        size_bytes: MAX_FILE_SIZE + 1,
        source: shared::domain::FileSource::Memory(Vec::new()),
    };
    let outcome = queue
        .select(
            &["owned.pdf".to_string()],
            vec![huge, file("a.pdf"), file("owned.pdf"), file("x.pdf"), file("x.pdf")],
        )
        .expect("select");

    assert_eq!(outcome.accepted, vec!["x.pdf".to_string()]);
    assert_eq!(
        outcome.rejections,
        vec![
            "\"huge.pdf\" exceeds 200MB limit".to_string(),
            "\"a.pdf\" is already selected".to_string(),
            "\"owned.pdf\" already exists. Remove it before adding again".to_string(),
            "\"x.pdf\" is already selected".to_string(),
        ]
    );
    assert_eq!(outcome.notice(), Some("\"huge.pdf\" exceeds 200MB limit"));
}

#[test]
fn caps_a_single_upload_at_ten_files() {
    let mut queue = UploadQueue::new();
    let files: Vec<SelectedFile> = names("new", 12).iter().map(|n| file(n)).collect();
    let outcome = queue.select(&[], files).expect("select");

    assert_eq!(outcome.accepted.len(), 10);
    assert_eq!(
        outcome.notice(),
        Some("Only 10 more document(s) can be added. Max limit is 10.")
    );
}

#[test]
fn removes_selected_file_before_upload() {
    let mut queue = UploadQueue::new();
    queue
        .select(&[], vec![file("a.pdf"), file("b.pdf")])
        .expect("select");
    assert!(queue.remove_selected("a.pdf").expect("remove"));
    assert!(!queue.remove_selected("missing.pdf").expect("remove"));
    assert_eq!(queue.selected_names(), vec!["b.pdf".to_string()]);
}

#[test]
fn batch_lifecycle_tracks_status_per_file() {
    let mut queue = UploadQueue::new();
    queue
        .select(&[], vec![file("a.pdf"), file("b.pdf")])
        .expect("select");

    let batch = queue.begin_batch().expect("begin");
    assert_eq!(batch.len(), 2);
    assert!(queue
        .progress()
        .iter()
        .all(|p| p.status == UploadStatus::Pending));
    assert!(matches!(queue.begin_batch(), Err(ClientError::Busy)));
    assert!(matches!(
        queue.select(&[], vec![file("c.pdf")]),
        Err(ClientError::Busy)
    ));

    queue.mark_uploading("a.pdf", 10);
    queue.set_percent("a.pdf", 55);
    queue.mark_complete("a.pdf");
    queue.set_percent("a.pdf", 70);
    queue.mark_uploading("b.pdf", 10);
    queue.mark_failed("b.pdf", "Corrupted or invalid file".into());

    let progress = queue.progress().to_vec();
    assert_eq!(progress[0].status, UploadStatus::Complete);
    assert_eq!(progress[0].percent, 100);
    assert_eq!(progress[1].status, UploadStatus::Failed);
    assert_eq!(progress[1].error.as_deref(), Some("Corrupted or invalid file"));

    let generation = queue.finish_batch();
    assert!(queue.selected().is_empty());
    assert!(queue.clear_progress_if(generation));
    assert!(queue.progress().is_empty());
}

#[test]
fn stale_progress_clear_does_not_touch_newer_batch() {
    let mut queue = UploadQueue::new();
    queue.select(&[], vec![file("a.pdf")]).expect("select");
    queue.begin_batch().expect("begin");
    let first = queue.finish_batch();

    queue.select(&[], vec![file("b.pdf")]).expect("select");
    queue.begin_batch().expect("begin");
    assert!(!queue.clear_progress_if(first));
    assert_eq!(queue.progress().len(), 1);
}

#[test]
fn empty_selection_starts_no_batch() {
    let mut queue = UploadQueue::new();
    assert!(queue.begin_batch().expect("begin").is_empty());
    assert!(!queue.is_in_flight());
}

#[test]
fn classifies_upload_failures_from_error_text() {
    let rejected = |detail: &str| GatewayError::Rejected {
        status: 400,
        detail: detail.to_string(),
    };

    assert_eq!(
        UploadFailure::classify(&rejected("Out of Memory while parsing")).message(),
        "Memory error - file too large"
    );
    assert_eq!(
        UploadFailure::classify(&rejected("PDF is corrupt")).message(),
        "Corrupted or invalid file"
    );
    assert_eq!(
        UploadFailure::classify(&rejected("Unsupported file type")).message(),
        "Incompatible file format"
    );
    assert_eq!(
        UploadFailure::classify(&GatewayError::Timeout {
            endpoint: "/api/documents/upload".into()
        }),
        UploadFailure::Network
    );
    assert_eq!(
        UploadFailure::classify(&rejected("Quota exceeded")).message(),
        "Quota exceeded"
    );
    assert_eq!(
        UploadFailure::classify(&rejected("Invalid PDF")).message(),
        "Invalid PDF"
    );
    assert_eq!(
        UploadFailure::classify(&rejected("Wrong Format")).message(),
        "Wrong Format"
    );
    assert_eq!(UploadFailure::Generic(String::new()).message(), "Upload failed");
}

#[test]
fn summary_messages_follow_outcome() {
    let mut summary = UploadSummary::default();
    assert_eq!(summary.message(), None);

    summary.succeeded = vec!["a.pdf".into()];
    assert_eq!(summary.message().as_deref(), Some("1 document added successfully"));
    assert_eq!(summary.level(), NoticeLevel::Success);

    summary.succeeded.push("c.pdf".into());
    assert_eq!(summary.message().as_deref(), Some("2 documents added successfully"));

    summary.failed = vec![("b.pdf".into(), "Corrupted or invalid file".into())];
    assert_eq!(summary.message().as_deref(), Some("2 uploaded, 1 failed"));
    assert_eq!(summary.level(), NoticeLevel::Warning);
    assert_eq!(summary.failure_kind(), Some(ErrorKind::PartialBatchFailure));

    summary.succeeded.clear();
    assert_eq!(
        summary.message().as_deref(),
        Some("Upload failed: Corrupted or invalid file")
    );
    assert_eq!(summary.level(), NoticeLevel::Error);
}
