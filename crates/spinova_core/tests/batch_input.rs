use pretty_assertions::assert_eq;
use spinova_core::{accept_batch_url, parse_batch_input, BatchJob, BatchSummary};

#[test]
fn non_url_records_are_skipped() {
    let input = "https://x/1\nnot-a-url\nhttps://x/2\n";
    let urls = parse_batch_input(input.as_bytes()).unwrap();

    assert_eq!(urls, vec!["https://x/1".to_string(), "https://x/2".to_string()]);
}

#[test]
fn only_first_field_is_used_and_trimmed() {
    let input = concat!(
        "  https://a.example/v?id=1 , title one\n",
        "\"http://b.example/v\",x,y\n",
        "ftp://c.example,z\n",
        ",https://d.example\n",
    );
    let urls = parse_batch_input(input.as_bytes()).unwrap();

    assert_eq!(
        urls,
        vec![
            "https://a.example/v?id=1".to_string(),
            "http://b.example/v".to_string()
        ]
    );
}

#[test]
fn scheme_check_is_case_insensitive_but_requires_separator() {
    assert_eq!(accept_batch_url("HTTPS://X/1"), Some("HTTPS://X/1".to_string()));
    assert_eq!(accept_batch_url("httpfoo"), None);
    assert_eq!(accept_batch_url(""), None);
}

#[test]
fn batch_expands_to_jobs_in_order() {
    let batch = BatchJob::new(
        vec!["https://x/1".into(), "https://x/2".into()],
        "bestaudio/best",
        "downloads",
    );
    let urls: Vec<_> = batch.jobs().map(|job| job.url).collect();

    assert_eq!(urls, batch.urls);
    assert_eq!(batch.len(), 2);
}

#[test]
fn summary_success_flag_requires_every_item() {
    let all_ok = BatchSummary::new(3, 3, 0, false, None);
    assert!(all_ok.success);
    assert_eq!(all_ok.attempted, 3);

    let one_failed = BatchSummary::new(3, 2, 1, false, None);
    assert!(!one_failed.success);
    assert_eq!(one_failed.attempted, 3);

    let cancelled = BatchSummary::new(3, 1, 0, true, None);
    assert!(!cancelled.success);
    assert_eq!(cancelled.attempted, 1);
}
