//! Playwright renderer session
//!
//! A single long-lived Node.js driver process owns the browser. Requests and
//! replies are newline-delimited JSON over the driver's stdin/stdout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use docproof_common::VisualSettings;

use crate::error::{VisualError, VisualResult};

/// Upper bound for the driver to load Playwright and launch an engine.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Slack on top of navigation timeout + settle delay before a reply is considered lost.
const REPLY_GRACE: Duration = Duration::from_secs(30);

/// How long the driver gets to close the browser before being signalled.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');

function emit(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

function loadPlaywright() {
  try {
    return require('playwright');
  } catch (error) {
    return require(require.resolve('playwright', { paths: [process.cwd()] }));
  }
}

(async () => {
  let playwright;
  try {
    playwright = loadPlaywright();
  } catch (error) {
    emit({ event: 'failed', errors: [`playwright: ${error.message.split('\n')[0]}`] });
    process.exit(1);
  }

  const engines = JSON.parse(process.argv[2] || '[]');
  const errors = [];
  let browser = null;
  let engine = null;
  for (const name of engines) {
    const browserType = playwright[name];
    if (!browserType) {
      errors.push(`${name}: unknown engine`);
      continue;
    }
    try {
      browser = await browserType.launch({ headless: true });
      engine = name;
      break;
    } catch (error) {
      errors.push(`${name}: ${error.message.split('\n')[0]}`);
    }
  }
  if (!browser) {
    emit({ event: 'failed', errors });
    process.exit(1);
  }
  emit({ event: 'ready', engine });

  const input = readline.createInterface({ input: process.stdin });
  for await (const line of input) {
    if (!line.trim()) continue;
    let request;
    try {
      request = JSON.parse(line);
    } catch (error) {
      emit({ id: null, ok: false, error: `malformed request: ${error.message}` });
      continue;
    }
    if (request.op === 'close') break;
    if (request.op !== 'screenshot') {
      emit({ id: request.id, ok: false, error: `unknown op: ${request.op}` });
      continue;
    }

    let context = null;
    try {
      context = await browser.newContext();
      const page = await context.newPage();
      await page.goto(request.url, { waitUntil: 'load', timeout: request.timeout_ms });
      await page.waitForTimeout(request.settle_ms);
      await page.screenshot({ path: request.path, fullPage: true });
      emit({ id: request.id, ok: true });
    } catch (error) {
      emit({ id: request.id, ok: false, error: error.message.split('\n')[0] });
    } finally {
      if (context) await context.close().catch(() => {});
    }
  }

  await browser.close().catch(() => {});
  process.exit(0);
})();
"#;

/// Startup event printed once by the driver.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum DriverEvent {
    Ready { engine: String },
    Failed { errors: Vec<String> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverRequest<'a> {
    Screenshot {
        id: u64,
        url: &'a str,
        path: &'a Path,
        timeout_ms: u64,
        settle_ms: u64,
    },
    Close,
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Handle to a running driver process with a launched browser.
pub struct RendererSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    engine: String,
    next_id: u64,
    closed: bool,
    _workdir: TempDir,
}

impl RendererSession {
    /// Spawn the driver and launch the first engine that starts.
    pub async fn launch(settings: &VisualSettings) -> VisualResult<Self> {
        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        let mut cmd = Command::new(&settings.node_binary);
        cmd.arg(&script_path)
            .arg(serde_json::to_string(&settings.engines)?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &settings.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        debug!("Spawning renderer driver: {}", script_path.display());
        let mut child = cmd.spawn().map_err(|e| {
            VisualError::RendererUnavailable(format!(
                "Unable to launch Playwright browser: failed to spawn {}: {}",
                settings.node_binary, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VisualError::Protocol("driver stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VisualError::Protocol("driver stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[renderer] {}", line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        let event = match read_message::<DriverEvent>(&mut stdout, LAUNCH_TIMEOUT).await {
            Ok(event) => event,
            Err(e) => {
                let _ = child.kill().await;
                return Err(VisualError::RendererUnavailable(format!(
                    "Unable to launch Playwright browser: {}",
                    e
                )));
            }
        };

        match event {
            DriverEvent::Ready { engine } => {
                info!("Renderer ready ({})", engine);
                Ok(Self {
                    child,
                    stdin,
                    stdout,
                    engine,
                    next_id: 0,
                    closed: false,
                    _workdir: workdir,
                })
            }
            DriverEvent::Failed { errors } => {
                let _ = child.kill().await;
                let reason = if errors.is_empty() {
                    "Unable to launch browser".to_string()
                } else {
                    errors.join("; ")
                };
                Err(VisualError::RendererUnavailable(format!(
                    "Unable to launch Playwright browser: {}",
                    reason
                )))
            }
        }
    }

    /// Engine that launched
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Render `html` in a fresh context and write a full-page screenshot to `output`.
    pub async fn screenshot(
        &mut self,
        html: &Path,
        output: &Path,
        settings: &VisualSettings,
    ) -> VisualResult<()> {
        let url = file_url(html)?;
        self.next_id += 1;
        let id = self.next_id;

        self.send(&DriverRequest::Screenshot {
            id,
            url: &url,
            path: output,
            timeout_ms: settings.navigation_timeout_ms,
            settle_ms: settings.settle_delay_ms,
        })
        .await?;

        let wait = Duration::from_millis(settings.navigation_timeout_ms + settings.settle_delay_ms)
            + REPLY_GRACE;
        loop {
            let reply: DriverReply = read_message(&mut self.stdout, wait).await?;
            if reply.id != Some(id) {
                debug!("Ignoring stale renderer reply {:?}", reply.id);
                continue;
            }
            return if reply.ok {
                Ok(())
            } else {
                Err(VisualError::Render(
                    reply.error.unwrap_or_else(|| "unknown renderer error".to_string()),
                ))
            };
        }
    }

    /// Close the browser and stop the driver.
    ///
    /// Asks the driver to exit first, then escalates to SIGTERM and finally kill.
    pub async fn close(mut self) -> VisualResult<()> {
        self.closed = true;
        info!("Stopping renderer ({})", self.engine);

        if self.send(&DriverRequest::Close).await.is_ok()
            && timeout(CLOSE_GRACE, self.child.wait()).await.is_ok()
        {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && timeout(Duration::from_millis(500), self.child.wait())
                        .await
                        .is_ok()
                {
                    return Ok(());
                }
            }
        }

        warn!("Renderer did not exit, killing it");
        self.child.kill().await?;
        Ok(())
    }

    async fn send(&mut self, request: &DriverRequest<'_>) -> VisualResult<()> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

impl Drop for RendererSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.start_kill();
        }
    }
}

/// Read the next JSON line, skipping anything that does not parse.
async fn read_message<T: DeserializeOwned>(
    lines: &mut Lines<BufReader<ChildStdout>>,
    wait: Duration,
) -> VisualResult<T> {
    let read = async {
        loop {
            let line = lines
                .next_line()
                .await?
                .ok_or_else(|| VisualError::Protocol("renderer exited unexpectedly".to_string()))?;
            match serde_json::from_str::<T>(&line) {
                Ok(message) => return Ok::<T, VisualError>(message),
                Err(_) => debug!("[renderer] {}", line),
            }
        }
    };

    match timeout(wait, read).await {
        Ok(result) => result,
        Err(_) => Err(VisualError::Protocol(format!(
            "no reply from renderer within {} seconds",
            wait.as_secs()
        ))),
    }
}

/// `file://` URL for a local document.
pub fn file_url(path: &Path) -> VisualResult<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    url::Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| VisualError::Render(format!("invalid document path {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_escapes_spaces() {
        let url = file_url(Path::new("/srv/my docs/index.html")).unwrap();
        assert_eq!(url, "file:///srv/my%20docs/index.html");
    }

    #[test]
    fn test_screenshot_request_wire_format() {
        let request = DriverRequest::Screenshot {
            id: 3,
            url: "file:///a.html",
            path: Path::new("/tmp/a_render.png"),
            timeout_ms: 60_000,
            settle_ms: 1_500,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["op"], "screenshot");
        assert_eq!(value["id"], 3);
        assert_eq!(value["path"], "/tmp/a_render.png");
        assert_eq!(value["settle_ms"], 1_500);

        let close = serde_json::to_string(&DriverRequest::Close).unwrap();
        assert_eq!(close, r#"{"op":"close"}"#);
    }

    #[test]
    fn test_driver_events_parse() {
        let ready: DriverEvent =
            serde_json::from_str(r#"{"event":"ready","engine":"webkit"}"#).unwrap();
        assert!(matches!(ready, DriverEvent::Ready { engine } if engine == "webkit"));

        let failed: DriverEvent =
            serde_json::from_str(r#"{"event":"failed","errors":["chromium: missing"]}"#).unwrap();
        assert!(matches!(failed, DriverEvent::Failed { errors } if errors.len() == 1));

        let reply: DriverReply =
            serde_json::from_str(r#"{"id":1,"ok":false,"error":"net::ERR_FILE_NOT_FOUND"}"#)
                .unwrap();
        assert_eq!(reply.id, Some(1));
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn test_launch_with_missing_node_is_unavailable() {
        let settings = VisualSettings {
            node_binary: "/nonexistent/docproof-node".to_string(),
            ..Default::default()
        };
        let err = RendererSession::launch(&settings).await.err().unwrap();
        assert!(matches!(err, VisualError::RendererUnavailable(_)));
        assert!(err.to_string().starts_with("Unable to launch Playwright browser"));
    }
}
