//! Callbacks run after an email has been rendered.

use log::{debug, info};
use serde_json::{Map, Value};
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use crate::config::SendHandlerConfig;
use crate::error::HookError;

/// Receives the rendered HTML of a successful preview request.
pub trait SendHandler: Send + Sync {
    fn send(&self, html: &str, data: &Map<String, Value>, template_path: &str)
        -> Result<(), HookError>;
}

impl<F> SendHandler for F
where
    F: Fn(&str, &Map<String, Value>, &str) -> Result<(), HookError> + Send + Sync,
{
    fn send(
        &self,
        html: &str,
        data: &Map<String, Value>,
        template_path: &str,
    ) -> Result<(), HookError> {
        self(html, data, template_path)
    }
}

/// Logs what would have been sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSendHandler;

impl SendHandler for LogSendHandler {
    fn send(
        &self,
        html: &str,
        data: &Map<String, Value>,
        template_path: &str,
    ) -> Result<(), HookError> {
        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        info!(
            "Email generated from {} (html length {}, data keys {:?})",
            template_path,
            html.len(),
            keys
        );
        Ok(())
    }
}

/// Pipes the HTML into an external command.
///
/// The data is passed as JSON in `MAILGEN_DATA` and the template path in
/// `MAILGEN_TEMPLATE`. A non-zero exit is a failure carrying stderr.
#[derive(Debug, Clone)]
pub struct CommandSendHandler {
    config: SendHandlerConfig,
}

impl CommandSendHandler {
    pub fn new(config: SendHandlerConfig) -> Self {
        Self { config }
    }
}

impl SendHandler for CommandSendHandler {
    fn send(
        &self,
        html: &str,
        data: &Map<String, Value>,
        template_path: &str,
    ) -> Result<(), HookError> {
        let command = &self.config.command;
        let data_json =
            serde_json::to_string(data).map_err(|e| HookError::Other(e.to_string()))?;

        let mut cmd = Command::new(command);
        cmd.args(&self.config.args)
            .env("MAILGEN_DATA", data_json)
            .env("MAILGEN_TEMPLATE", template_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running send command {} for {}", command, template_path);

        let mut child = cmd.spawn().map_err(|source| HookError::Spawn {
            command: command.clone(),
            source,
        })?;

        // stdin is fed from its own thread so a command that writes a lot
        // before reading cannot block on a full stdout pipe.
        let stdin = child.stdin.take();
        let output = thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    // A command may exit without reading its input; its exit
                    // status decides the outcome.
                    if let Err(e) = stdin.write_all(html.as_bytes()) {
                        debug!("Send command stopped reading stdin: {}", e);
                    }
                });
            }
            child.wait_with_output()
        })
        .map_err(|e| HookError::Other(format!("Failed to wait for send command: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(HookError::Failed {
                command: command.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn handler(script: &str) -> CommandSendHandler {
        CommandSendHandler::new(SendHandlerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    #[test]
    fn test_command_receives_html_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let script = format!(
            "cat > {0} && printf '%s|%s' \"$MAILGEN_TEMPLATE\" \"$MAILGEN_DATA\" >> {0}",
            out.display()
        );
        let mut data = Map::new();
        data.insert("title".to_string(), Value::from("Hi"));

        handler(&script)
            .send("<p>hello</p>", &data, "/app/emails/welcome.vue")
            .unwrap();

        let written = std::fs::read_to_string(out).unwrap();
        assert_eq!(
            written,
            r#"<p>hello</p>/app/emails/welcome.vue|{"title":"Hi"}"#
        );
    }

    #[test]
    fn test_command_failure_reports_stderr() {
        let err = handler("echo smtp down >&2; exit 3")
            .send("", &Map::new(), "x.vue")
            .unwrap_err();
        match err {
            HookError::Failed { stderr, .. } => assert_eq!(stderr, "smtp down"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_chatty_command_does_not_block() {
        let html = "x".repeat(200_000);
        handler("head -c 200000 /dev/zero; cat > /dev/null")
            .send(&html, &Map::new(), "x.vue")
            .unwrap();
    }

    #[test]
    fn test_command_ignoring_stdin_succeeds() {
        let html = "x".repeat(1_000_000);
        handler("exit 0").send(&html, &Map::new(), "x.vue").unwrap();
    }

    #[test]
    fn test_command_ignoring_stdin_reports_exit_status() {
        let html = "x".repeat(1_000_000);
        let err = handler("exit 4")
            .send(&html, &Map::new(), "x.vue")
            .unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));
    }

    #[test]
    fn test_missing_command_is_spawn_error() {
        let handler = CommandSendHandler::new(SendHandlerConfig {
            command: "/definitely/not/a/command".to_string(),
            args: Vec::new(),
        });
        assert!(matches!(
            handler.send("", &Map::new(), "x.vue"),
            Err(HookError::Spawn { .. })
        ));
    }
}
