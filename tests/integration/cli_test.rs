use std::path::PathBuf;
use std::process::{Command, Output};

fn agentos_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_agentos"))
}

fn run_agentos_with_env(args: &[&str], env_vars: Vec<(&str, &str)>) -> Output {
    let mut cmd = Command::new(agentos_binary());
    cmd.args(args)
        .current_dir(std::env::temp_dir())
        .env_remove("RUST_LOG")
        .env_remove("AGENTOS_LOG_LEVEL")
        .env_remove("AGENTOS_API_BASE_URL")
        .env_remove("AGENTOS_WS_BASE_URL");
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute agentos command")
}

fn run_agentos(args: &[&str]) -> Output {
    run_agentos_with_env(args, Vec::new())
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_agentos(&["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("agentos"));
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_agentos(&["--no-color", "version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        assert!(stdout.contains("AgentOS Version Information"));
        assert!(stdout.contains("Apache-2.0"));
    }

    #[test]
    fn test_version_flag() {
        let output = run_agentos(&["--version"]);
        assert!(output.status.success());
        assert!(output_to_string(&output).contains(env!("CARGO_PKG_VERSION")));
    }
}

mod config_command_tests {
    use super::*;

    #[test]
    fn test_config_shows_defaults() {
        let output = run_agentos(&["--no-color", "config"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "stderr: {}", stderr_to_string(&output));
        assert!(stdout.contains("http://localhost:8000/api"));
        assert!(stdout.contains("ws://localhost:8000/ws"));
        assert!(stdout.contains("100 chars"));
    }

    #[test]
    fn test_config_env_override() {
        let output = run_agentos_with_env(
            &["--no-color", "config"],
            vec![
                ("AGENTOS_API_BASE_URL", "https://agents.example.com/api"),
                ("AGENTOS_STREAM__RECONNECT", "true"),
            ],
        );
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "stderr: {}", stderr_to_string(&output));
        assert!(stdout.contains("https://agents.example.com/api"));
        assert!(stdout.contains("Reconnect:") && stdout.contains("true"));
    }

    #[test]
    fn test_invalid_config_fails() {
        let output = run_agentos_with_env(
            &["--no-color", "config"],
            vec![("AGENTOS_API_BASE_URL", "ftp://agents.example.com")],
        );
        let stderr = stderr_to_string(&output);

        assert!(!output.status.success());
        assert!(stderr.contains("E2005"), "stderr: {}", stderr);
        assert!(stderr.contains("api.base_url"));
    }
}

mod argument_tests {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = run_agentos(&["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        for command in ["start", "watch", "show", "kill", "resume", "config"] {
            assert!(stdout.contains(command), "help should mention {}", command);
        }
    }

    #[test]
    fn test_show_requires_agent_id() {
        let output = run_agentos(&["show"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("AGENT_ID"));
    }

    #[test]
    fn test_show_rejects_unknown_format() {
        let output = run_agentos(&["show", "a-1", "--format", "yaml"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("yaml"));
    }

    #[test]
    fn test_unknown_command() {
        let output = run_agentos(&["explode"]);
        assert!(!output.status.success());
    }
}

mod offline_tests {
    use super::*;

    #[test]
    fn test_show_against_unreachable_control_plane() {
        let output = run_agentos_with_env(
            &["--no-color", "show", "a-1"],
            vec![("AGENTOS_API_BASE_URL", "http://127.0.0.1:1/api")],
        );
        let stderr = stderr_to_string(&output);

        assert!(!output.status.success());
        assert!(stderr.contains("E5005"), "stderr: {}", stderr);
    }
}
