use assert_cmd::cargo::cargo_bin_cmd;

fn help_for(args: &[&str]) -> String {
    let mut cmd = cargo_bin_cmd!("taskwatchctl");
    let output = cmd
        .args(args)
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn top_level_help_lists_subcommands() {
    let text = help_for(&[]);
    for command in ["show", "watch", "busy", "sync", "download"] {
        assert!(text.contains(command), "help missing '{command}'");
    }
    assert!(text.contains("--server"), "help missing --server");
}

#[test]
fn watch_help_mentions_both_targets() {
    let text = help_for(&["watch"]);
    assert!(text.contains("--task"), "watch help missing --task");
    assert!(text.contains("--type"), "watch help missing --type");
}

#[test]
fn sync_help_mentions_recent() {
    let text = help_for(&["sync"]);
    assert!(text.contains("--recent"), "sync help missing --recent");
}

#[test]
fn watch_without_target_is_rejected() {
    let mut cmd = cargo_bin_cmd!("taskwatchctl");
    cmd.arg("watch").assert().failure();
}

#[test]
fn invalid_server_url_fails_before_connecting() {
    let mut cmd = cargo_bin_cmd!("taskwatchctl");
    cmd.args(["show", "t1", "--server", "ftp://tasks.local"])
        .env_remove("TASKWATCH_CONFIG_PATH")
        .env_remove("TASKWATCH_CONFIG_JSON")
        .assert()
        .failure();
}
