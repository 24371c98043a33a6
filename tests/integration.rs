use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn litc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("litc");
    path
}

const RASHOMON: &str = "羅生門\n芥川龍之介\n\
-------------------------------------------------------\n\
【テキスト中に現れる記号について】\n\
《》：ルビ\n\
-------------------------------------------------------\n\
\u{3000}ある日の暮方《くれがた》の事である。一人の下人《げにん》が、羅生門の下で雨やみを待っていた。\n\
\u{3000}広い門の下には、この男のほかに誰もいない。［＃「誰」に傍点］\n\
\n\
\u{3000}下人は、老婆をつき倒した。「」\n\
\u{3000}下人の行方《ゆくえ》は、誰も知らない。\n\
\n\
底本：「芥川龍之介全集　第一巻」岩波書店\n\
入力：j.utiyama\n";

const NO_BODY: &str = "無題\n作者不明\n本文のみ\n";

fn write_archive(path: &Path) {
    let (sjis, _, had_errors) = encoding_rs::SHIFT_JIS.encode(RASHOMON);
    assert!(!had_errors);

    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("rashomon/127_ruby_150.txt", options).unwrap();
    zip.write_all(&sjis).unwrap();
    zip.start_file("rashomon/readme.txt", options).unwrap();
    zip.write_all(NO_BODY.as_bytes()).unwrap();
    zip.start_file("__MACOSX/rashomon/._127_ruby_150.txt", options)
        .unwrap();
    zip.write_all(b"\x00\x05\x16\x07").unwrap();
    zip.finish().unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let archive = root.join("127_ruby_150.zip");
    write_archive(&archive);

    let config_content = format!(
        r#"[db]
path = "{root}/data/litc.sqlite"

[author]
id = "000879"
name = "芥川龍之介"

[output]
dir = "{root}/out_000879"
write_title = true
write_header = true
save_utf8_org = true
delimiter = "tab"

[archive]
source = "{root}/127_ruby_150.zip"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("litc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_litc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = litc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run litc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_litc(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_litc(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_writes_outputs_and_skips_bad_file() {
    let (tmp, config_path) = setup_test_env();

    run_litc(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_litc(&config_path, &["ingest", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("text files found: 2"), "stdout={}", stdout);
    assert!(stdout.contains("works written: 1"));
    assert!(stdout.contains("skipped: 1"));
    assert!(stdout.contains("readme.txt"));

    let out = tmp.path().join("out_000879");
    let cleansed = fs::read_to_string(out.join("edit/127_ruby_150_clns_utf-8.txt")).unwrap();
    assert_eq!(
        cleansed,
        "text\ttitle\n\
         ある日の暮方の事である。一人の下人が、羅生門の下で雨やみを待っていた。\t羅生門\n\
         広い門の下には、この男のほかに誰もいない。\t羅生門\n\
         下人は、老婆をつき倒した。\t羅生門\n\
         下人の行方は、誰も知らない。\t羅生門\n"
    );

    let original = fs::read_to_string(out.join("org/127_ruby_150_org_utf-8.tsv")).unwrap();
    assert!(original.starts_with("text\n羅生門\n芥川龍之介\n"));
    assert!(original.contains("底本：「芥川龍之介全集　第一巻」岩波書店"));
}

#[test]
fn test_reingest_is_idempotent() {
    let (tmp, config_path) = setup_test_env();

    run_litc(&config_path, &["init"]);
    run_litc(&config_path, &["ingest", "--clean", "--progress", "off"]);
    let edit = tmp.path().join("out_000879/edit/127_ruby_150_clns_utf-8.txt");
    let first = fs::read(&edit).unwrap();

    let (stdout, stderr, success) =
        run_litc(&config_path, &["ingest", "--clean", "--progress", "off"]);
    assert!(success, "re-ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(first, fs::read(&edit).unwrap());

    let (stdout, _, success) = run_litc(&config_path, &["works"]);
    assert!(success);
    assert!(stdout.contains("(1 works)"), "stdout={}", stdout);
    assert!(stdout.contains("羅生門  [4 lines]"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    run_litc(&config_path, &["init"]);
    let (stdout, _, success) =
        run_litc(&config_path, &["ingest", "--dry-run", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(!tmp.path().join("out_000879").exists());
}

#[test]
fn test_show_stored_work() {
    let (_tmp, config_path) = setup_test_env();

    run_litc(&config_path, &["init"]);
    run_litc(&config_path, &["ingest", "--progress", "off"]);

    let (stdout, _, success) = run_litc(&config_path, &["show", "羅生門"]);
    assert!(success);
    assert!(stdout.contains("下人の行方は、誰も知らない。"));

    let (_, stderr, success) = run_litc(&config_path, &["show", "河童"]);
    assert!(!success);
    assert!(stderr.contains("work not found"));
}

#[test]
fn test_extract_preserves_macos_metadata_dir() {
    let (tmp, config_path) = setup_test_env();
    let dest = tmp.path().join("extract");
    fs::create_dir_all(dest.join("__MACOSX")).unwrap();
    fs::write(dest.join("__MACOSX/keep"), "x").unwrap();
    fs::write(dest.join("stale.txt"), "x").unwrap();

    let (stdout, stderr, success) =
        run_litc(&config_path, &["extract", dest.to_str().unwrap()]);
    assert!(success, "extract failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files: 2"));
    assert!(dest.join("__MACOSX/keep").is_file());
    assert!(!dest.join("stale.txt").exists());
    assert!(dest.join("rashomon/127_ruby_150.txt").is_file());
}

#[test]
fn test_record_upsert_by_pair_and_id() {
    let (_tmp, config_path) = setup_test_env();
    run_litc(&config_path, &["init"]);

    let (stdout, stderr, success) = run_litc(
        &config_path,
        &["record", "--user", "a", "--title", "羅生門", "--summary", "S1"],
    );
    assert!(success, "record failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("record 1 saved"));

    let (stdout, _, success) = run_litc(
        &config_path,
        &[
            "record", "--user", "a", "--title", "羅生門", "--summary", "S2", "--scores",
            "6,7,8,5,9",
        ],
    );
    assert!(success);
    assert!(stdout.contains("record 1 saved"));

    let (stdout, _, success) = run_litc(&config_path, &["records"]);
    assert!(success);
    assert_eq!(stdout.lines().count(), 1, "stdout={}", stdout);
    assert!(stdout.contains("scores=6/7/8/5/9"));

    let (stdout, _, success) = run_litc(
        &config_path,
        &["record", "--id", "1", "--user", "a", "--title", "羅生門", "--summary", "S3"],
    );
    assert!(success);
    assert!(stdout.contains("record 1 saved"));

    let (stdout, _, success) = run_litc(&config_path, &["records", "--id", "1"]);
    assert!(success);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["summary"], "S3");
    assert_eq!(record["scores"]["insight"], 9);
}

#[test]
fn test_record_rejects_out_of_range_scores() {
    let (_tmp, config_path) = setup_test_env();
    run_litc(&config_path, &["init"]);

    let (_, _, success) = run_litc(
        &config_path,
        &["record", "--user", "a", "--title", "羅生門", "--scores", "6,7,8,5,11"],
    );
    assert!(!success);
}

#[test]
fn test_chat_requires_llm_provider() {
    let (_tmp, config_path) = setup_test_env();
    run_litc(&config_path, &["init"]);
    run_litc(&config_path, &["ingest", "--progress", "off"]);

    let (_, stderr, success) = run_litc(
        &config_path,
        &["chat", "--user", "a", "--title", "羅生門", "こんにちは"],
    );
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_push_dry_run_lists_objects() {
    let (tmp, config_path) = setup_test_env();
    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str("\n[s3]\nbucket = \"lit-bucket\"\nprefix = \"000879\"\n");
    fs::write(&config_path, config).unwrap();

    run_litc(&config_path, &["init"]);
    run_litc(&config_path, &["ingest", "--progress", "off"]);

    let (stdout, stderr, success) = run_litc(&config_path, &["push", "--dry-run"]);
    assert!(success, "push failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("000879/edit/127_ruby_150_clns_utf-8.txt"));
    assert!(stdout.contains("000879/db/litc.sqlite"));
    assert!(tmp.path().join("data/litc.sqlite").is_file());
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_litc(&tmp.path().join("nope.toml"), &["works"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
