// Adversarial requests through the full authorization chain
//
// Every case here must be refused before anything is spawned, so the runner
// is a spy that records calls instead of running git.

mod helpers;

use async_trait::async_trait;
use gitgate::error::ExecResult;
use gitgate::git::GitInvocation;
use gitgate::{Config, Dispatcher, ExecutionResult, GitRunner, RejectionKind, Request};
use helpers::Workspace;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct SpyRunner {
    calls: Mutex<Vec<GitInvocation>>,
}

#[async_trait]
impl GitRunner for SpyRunner {
    async fn run(&self, invocation: &GitInvocation) -> ExecResult<ExecutionResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(ExecutionResult {
            exit_code: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
            truncated: false,
            timed_out: false,
            duration: Duration::ZERO,
        })
    }
}

const COMMANDS: &[&str] = &[
    "status", "log", "diff", "show", "fetch", "pull", "rebase", "grep", "bisect", "submodule",
    "filter-branch", "ls-remote", "clone", "config", "format-patch", "send-email", "instaweb",
];

fn setup() -> (Workspace, Config, Arc<SpyRunner>, Dispatcher) {
    let ws = Workspace::new();
    fs::create_dir_all(ws.repo.join("src")).unwrap();
    fs::write(ws.repo.join("src").join("main.rs"), "fn main() {}").unwrap();

    let config = ws.config(COMMANDS);
    let spy = Arc::new(SpyRunner::default());
    let dispatcher = Dispatcher::new(spy.clone());
    (ws, config, spy, dispatcher)
}

async fn assert_rejected(cases: &[(&str, &[&str])], expected: RejectionKind) {
    let (ws, config, spy, dispatcher) = setup();

    for (subcommand, args) in cases {
        let request = Request::new(42, "home", ws.repo_str(), subcommand, args);
        let err = dispatcher
            .dispatch(&config, &request)
            .await
            .expect_err(&format!("should be rejected: git {} {:?}", subcommand, args));
        assert_eq!(
            err.rejection_kind(),
            Some(expected),
            "git {} {:?}",
            subcommand,
            args
        );
    }

    assert!(spy.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_shell_metacharacters() {
    assert_rejected(
        &[
            ("status", &["; rm -rf /"]),
            ("status", &["&&", "id"]),
            ("log", &["$(id)"]),
            ("log", &["`id`"]),
            ("log", &["${HOME}"]),
            ("log", &["a|b"]),
            ("log", &[">", "out.txt"]),
            ("log", &["<in.txt"]),
            ("log", &["line\nbreak"]),
        ],
        RejectionKind::InvalidArgument,
    )
    .await;
}

#[tokio::test]
async fn test_program_running_options() {
    assert_rejected(
        &[
            ("fetch", &["--upload-pack=touch /tmp/pwned"]),
            ("fetch", &["--upload-pack", "evil"]),
            ("fetch", &["--upload-p=evil"]),
            ("pull", &["--receive-pack=evil"]),
            ("rebase", &["--exec=id"]),
            ("rebase", &["--exec", "id"]),
            ("rebase", &["-x", "id"]),
            ("rebase", &["-ix", "id"]),
            ("grep", &["-Oevil", "pattern"]),
            ("ls-remote", &["-u", "evil"]),
            ("clone", &["-u", "evil"]),
            ("status", &["--exec-path=/tmp"]),
            ("filter-branch", &["--setup", "touch /tmp/pwned"]),
            ("send-email", &["--to-cmd=id"]),
            ("send-email", &["--cc-cmd=id"]),
            ("send-email", &["--header-cmd=id"]),
            ("send-email", &["--sendmail-cmd=id"]),
            ("instaweb", &["--httpd=id"]),
            ("instaweb", &["--browser=id"]),
        ],
        RejectionKind::InvalidArgument,
    )
    .await;
}

#[tokio::test]
async fn test_config_overrides() {
    assert_rejected(
        &[
            ("status", &["-c", "core.pager=sh"]),
            ("status", &["-ccore.pager=sh"]),
            ("log", &["--config=core.pager=sh"]),
            ("log", &["--config-env=core.pager=EVIL"]),
            ("config", &["core.sshCommand", "evil"]),
            ("config", &["core.fsmonitor", "evil"]),
            ("config", &["alias.x", "!sh"]),
            ("fetch", &["core.sshCommand=evil"]),
        ],
        RejectionKind::InvalidArgument,
    )
    .await;
}

#[tokio::test]
async fn test_repository_redirection() {
    assert_rejected(
        &[
            ("status", &["--git-dir=/etc"]),
            ("status", &["--work-tree=/"]),
            ("log", &["--namespace=x"]),
            ("format-patch", &["--output-directory=/tmp"]),
            ("log", &["--output=/tmp/log.txt"]),
            ("diff", &["--output=notes.txt"]),
        ],
        RejectionKind::InvalidArgument,
    )
    .await;
}

#[tokio::test]
async fn test_dangerous_subcommand_forms() {
    assert_rejected(
        &[
            ("bisect", &["run", "sh", "-c", "id"]),
            ("submodule", &["foreach", "id"]),
            ("filter-branch", &["--tree-filter", "rm -rf ."]),
            ("filter-branch", &["--index-filter=id"]),
        ],
        RejectionKind::InvalidArgument,
    )
    .await;
}

#[tokio::test]
async fn test_path_arguments_escaping_repository() {
    assert_rejected(
        &[
            ("show", &["../../../etc/passwd"]),
            ("diff", &["/etc/passwd"]),
            ("log", &["--", "../sibling"]),
            ("diff", &["~/.ssh/id_rsa"]),
            ("log", &["--follow", "src/../../outside"]),
            ("log", &["-S/etc/passwd"]),
            ("grep", &["-f../../patterns"]),
        ],
        RejectionKind::InvalidArgument,
    )
    .await;
}

#[tokio::test]
async fn test_too_many_arguments() {
    let (ws, config, spy, dispatcher) = setup();
    let args: Vec<String> = (0..65).map(|i| format!("-{}", i % 9 + 1)).collect();

    let request = Request {
        extra_args: args,
        ..Request::new(42, "home", ws.repo_str(), "log", &[])
    };
    let err = dispatcher.dispatch(&config, &request).await.unwrap_err();

    assert_eq!(err.rejection_kind(), Some(RejectionKind::InvalidArgument));
    assert!(spy.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unauthorized_requester_learns_nothing_else() {
    let (ws, config, spy, dispatcher) = setup();
    let missing = format!("{}/does-not-exist", ws.root.display());

    let probes = [
        Request::new(7, "home", ws.repo_str(), "status", &[]),
        Request::new(7, "home", "/etc", "status", &[]),
        Request::new(7, "home", &missing, "status", &[]),
        Request::new(7, "home", ws.repo_str(), "push", &["--force"]),
        Request::new(7, "home", ws.repo_str(), "log", &["$(id)"]),
    ];

    for request in probes {
        let err = dispatcher.dispatch(&config, &request).await.unwrap_err();
        assert_eq!(err.rejection_kind(), Some(RejectionKind::UnauthorizedUser));
    }
    assert!(spy.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_home_directory_is_never_a_target() {
    let (_ws, config, spy, dispatcher) = setup();

    for raw in ["~", "~/"] {
        let request = Request::new(42, "home", raw, "status", &[]);
        let err = dispatcher.dispatch(&config, &request).await.unwrap_err();
        assert_eq!(err.rejection_kind(), Some(RejectionKind::PathNotAllowed));
    }
    assert!(spy.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_benign_arguments_pass_through_verbatim() {
    let (ws, config, spy, dispatcher) = setup();

    let accepted: &[(&str, &[&str])] = &[
        ("log", &["-5", "--oneline"]),
        ("log", &["--since=2.weeks", "--author=Alice"]),
        ("diff", &["HEAD~3..HEAD", "--stat"]),
        ("show", &["HEAD:src/main.rs"]),
        ("log", &["--", "src/main.rs"]),
        ("log", &["--follow", "./src/main.rs"]),
        ("grep", &["-n", "fn main"]),
        ("rebase", &["-i", "HEAD~2"]),
        ("config", &["user.name"]),
        ("status", &["--porcelain=v2", "--branch"]),
        ("log", &["--cc", "-1"]),
        ("format-patch", &["-1", "--to=dev@example.com"]),
    ];

    for (subcommand, args) in accepted {
        let request = Request::new(42, "home", ws.repo_str(), subcommand, args);
        dispatcher
            .dispatch(&config, &request)
            .await
            .unwrap_or_else(|e| panic!("git {} {:?} rejected: {}", subcommand, args, e));
    }

    let calls = spy.calls.lock().unwrap();
    assert_eq!(calls.len(), accepted.len());
    for (call, (subcommand, args)) in calls.iter().zip(accepted) {
        assert_eq!(call.subcommand, *subcommand);
        assert_eq!(call.args, *args);
        assert_eq!(call.working_dir, ws.repo);
    }
}
