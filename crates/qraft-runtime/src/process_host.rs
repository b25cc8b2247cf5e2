use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::RuntimeError;
use crate::host::{HostFuture, Interpreter, RuntimeHost};

const RESULT_MARKER: &str = "__qraft_result__:";
const INVALID_MARKER: &str = "__qraft_invalid__:";

/// Oldest interpreter the harness supports.
const MIN_PYTHON: (u32, u32) = (3, 8);

/// Runs the program read from stdin and reports the value of its trailing
/// expression as JSON on a marker line.
const HARNESS: &str = r#"
import ast
import json
import sys

source = sys.stdin.read()
tree = ast.parse(source, "<qraft>", "exec")
tail = None
if tree.body and isinstance(tree.body[-1], ast.Expr):
    tail = ast.Expression(tree.body.pop().value)

namespace = {"__name__": "__main__"}
exec(compile(tree, "<qraft>", "exec"), namespace)
value = eval(compile(tail, "<qraft>", "eval"), namespace) if tail is not None else None

try:
    encoded = json.dumps(value)
except (TypeError, ValueError):
    sys.stdout.write("\n__qraft_invalid__:" + type(value).__name__ + "\n")
else:
    sys.stdout.write("\n__qraft_result__:" + encoded + "\n")
"#;

/// Runtime host backed by a local CPython installation.
///
/// The loader is a private virtual environment:
/// ```text
/// {env_dir}/
///   bin/python        - interpreter used for every invocation
///   lib/.../site-packages
/// ```
/// It is created on first bootstrap and reused afterwards.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    python: String,
    env_dir: PathBuf,
}

impl Default for ProcessHost {
    fn default() -> Self {
        Self::new("python3", Self::default_env_dir())
    }
}

impl ProcessHost {
    pub fn new(python: impl Into<String>, env_dir: PathBuf) -> Self {
        Self {
            python: python.into(),
            env_dir,
        }
    }

    /// Default environment location: the user cache dir, under `qraft/pyenv`.
    pub fn default_env_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qraft")
            .join("pyenv")
    }

    pub fn env_dir(&self) -> &Path {
        &self.env_dir
    }

    fn env_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.env_dir.join("Scripts").join("python.exe")
        } else {
            self.env_dir.join("bin").join("python")
        }
    }
}

impl RuntimeHost for ProcessHost {
    fn is_supported(&self) -> bool {
        resolve_executable(&self.python).is_some()
    }

    fn loader_present(&self) -> bool {
        self.env_python().is_file()
    }

    fn inject_loader(&self) -> HostFuture<'_, ()> {
        Box::pin(async move {
            tracing::info!(env_dir = %self.env_dir.display(), "Creating Python environment");

            let output = Command::new(&self.python)
                .args(["-m", "venv"])
                .arg(&self.env_dir)
                .output()
                .await
                .map_err(|e| {
                    RuntimeError::LoaderFailed(format!("failed to run {}: {e}", self.python))
                })?;

            if !output.status.success() {
                return Err(RuntimeError::LoaderFailed(format!(
                    "{} -m venv exited with {}: {}",
                    self.python,
                    output.status,
                    stderr_tail(&output.stderr)
                )));
            }
            Ok(())
        })
    }

    fn instantiate<'a>(&'a self, index_url: &'a str) -> HostFuture<'a, Arc<dyn Interpreter>> {
        Box::pin(async move {
            let python = self.env_python();
            let output = Command::new(&python)
                .args(["-c", "import sys; print('%d.%d' % sys.version_info[:2])"])
                .output()
                .await
                .map_err(|e| {
                    RuntimeError::InstantiationFailed(format!("{}: {e}", python.display()))
                })?;

            if !output.status.success() {
                return Err(RuntimeError::InstantiationFailed(format!(
                    "{} exited with {}: {}",
                    python.display(),
                    output.status,
                    stderr_tail(&output.stderr)
                )));
            }

            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            match parse_version(&version) {
                Some(v) if v >= MIN_PYTHON => {}
                _ => {
                    return Err(RuntimeError::InstantiationFailed(format!(
                        "Python {version} found, {}.{} or newer required",
                        MIN_PYTHON.0, MIN_PYTHON.1
                    )));
                }
            }

            tracing::info!(version, python = %python.display(), "Python interpreter ready");
            let interpreter: Arc<dyn Interpreter> = Arc::new(ProcessInterpreter {
                python,
                index_url: index_url.to_string(),
            });
            Ok(interpreter)
        })
    }
}

/// Interpreter living in a [`ProcessHost`] environment. Each program runs in
/// a fresh process, so no Python state carries over between invocations.
pub struct ProcessInterpreter {
    python: PathBuf,
    index_url: String,
}

impl Interpreter for ProcessInterpreter {
    fn load_packages<'a>(&'a self, packages: &'a [String]) -> HostFuture<'a, ()> {
        Box::pin(async move {
            if packages.is_empty() {
                return Ok(());
            }

            let output = Command::new(&self.python)
                .args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check"])
                .args(["--index-url", &self.index_url])
                .args(packages)
                .output()
                .await
                .map_err(|e| RuntimeError::PackageLoadFailed(e.to_string()))?;

            if !output.status.success() {
                return Err(RuntimeError::PackageLoadFailed(format!(
                    "pip exited with {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                )));
            }
            Ok(())
        })
    }

    fn run_python<'a>(&'a self, source: &'a str) -> HostFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move {
            let mut child = Command::new(&self.python)
                .args(["-c", HARNESS])
                .env("PIP_INDEX_URL", &self.index_url)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| RuntimeError::InvocationFailed(format!("failed to spawn: {e}")))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(source.as_bytes()).await?;
                // Dropping closes the pipe so the harness sees EOF.
            }

            let output = child.wait_with_output().await?;
            if !output.status.success() {
                return Err(RuntimeError::InvocationFailed(format!(
                    "python exited with {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                )));
            }

            parse_harness_output(&String::from_utf8_lossy(&output.stdout))
        })
    }
}

fn parse_harness_output(stdout: &str) -> Result<Option<serde_json::Value>, RuntimeError> {
    let mut result = None;
    for line in stdout.lines() {
        if let Some(json) = line.strip_prefix(RESULT_MARKER) {
            result = Some(json);
        } else if let Some(type_name) = line.strip_prefix(INVALID_MARKER) {
            return Err(RuntimeError::InvalidResult(format!(
                "value of type {type_name} cannot be converted"
            )));
        } else if !line.is_empty() {
            tracing::debug!(target: "qraft_runtime::python", "{line}");
        }
    }

    let json = result.ok_or_else(|| RuntimeError::InvalidResult("no result reported".into()))?;
    match serde_json::from_str(json) {
        Ok(serde_json::Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(RuntimeError::InvalidResult(e.to_string())),
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Last few lines of stderr; pip and tracebacks put the useful part at the end.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

/// Locate an executable by path or on `PATH`, without running it.
fn resolve_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let direct = dir.join(name);
        if direct.is_file() {
            return Some(direct);
        }
        let exe = dir.join(format!("{name}.exe"));
        (cfg!(windows) && exe.is_file()).then_some(exe)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_marker_among_prints() {
        let stdout = "Python packages installed successfully\n\n__qraft_result__:{\"url\":\"data:x\"}\n";
        let value = parse_harness_output(stdout).unwrap().unwrap();
        assert_eq!(value["url"], "data:x");
    }

    #[test]
    fn null_result_is_none() {
        assert_eq!(parse_harness_output("\n__qraft_result__:null\n").unwrap(), None);
    }

    #[test]
    fn unconvertible_result_is_invalid() {
        let err = parse_harness_output("\n__qraft_invalid__:bytes\n").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidResult(msg) if msg.contains("bytes")));
    }

    #[test]
    fn missing_marker_is_invalid() {
        let err = parse_harness_output("some noise\n").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidResult(_)));
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("3.12"), Some((3, 12)));
        assert_eq!(parse_version("garbage"), None);
        assert!(parse_version("3.7").unwrap() < MIN_PYTHON);
    }

    #[test]
    fn missing_interpreter_is_unsupported() {
        let host = ProcessHost::new(
            "definitely-not-a-python-binary-7c1e",
            PathBuf::from("/nonexistent"),
        );
        assert!(!host.is_supported());

        let host = ProcessHost::new("/nonexistent/bin/python3", PathBuf::from("/nonexistent"));
        assert!(!host.is_supported());
    }

    #[test]
    fn loader_present_tracks_env_interpreter() {
        let tmp = tempfile::tempdir().unwrap();
        let host = ProcessHost::new("python3", tmp.path().to_path_buf());
        assert!(!host.loader_present());

        let python = host.env_python();
        std::fs::create_dir_all(python.parent().unwrap()).unwrap();
        std::fs::write(&python, b"").unwrap();
        assert!(host.loader_present());
    }

    fn system_interpreter() -> Option<ProcessInterpreter> {
        let python = resolve_executable("python3")?;
        Some(ProcessInterpreter {
            python,
            index_url: crate::config::DEFAULT_INDEX_URL.into(),
        })
    }

    #[tokio::test]
    async fn harness_echoes_escaped_content() {
        let Some(interpreter) = system_interpreter() else {
            eprintln!("python3 not found, skipping");
            return;
        };
        let content = "say \"hi\" to C:\\temp\\new\nsecond line\r\nend";
        let source = format!(
            "content = \"{}\"\nprint(\"noise\")\n{{\"content\": content, \"n\": 2}}\n",
            crate::program::escape_python_string(content)
        );

        let value = interpreter.run_python(&source).await.unwrap().unwrap();
        assert_eq!(value["content"], content);
        assert_eq!(value["n"], 2);
    }

    #[tokio::test]
    async fn harness_reports_statement_and_unconvertible_tails() {
        let Some(interpreter) = system_interpreter() else {
            eprintln!("python3 not found, skipping");
            return;
        };
        assert_eq!(interpreter.run_python("x = 1\n").await.unwrap(), None);

        let err = interpreter.run_python("b\"raw\"\n").await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidResult(msg) if msg.contains("bytes")));

        let err = interpreter.run_python("raise ValueError(\"nope\")\n").await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvocationFailed(msg) if msg.contains("nope")));
    }

    /// Runs the real plain template against a stand-in `segno` module so the
    /// synthesized program is executed without installing anything.
    #[tokio::test]
    async fn rendered_plain_program_runs() {
        let Some(interpreter) = system_interpreter() else {
            eprintln!("python3 not found, skipping");
            return;
        };
        let modules = tempfile::tempdir().unwrap();
        std::fs::write(
            modules.path().join("segno.py"),
            "class _Qr:\n\
             \x20   def __init__(self, content):\n\
             \x20       self.content = content\n\
             \x20   def save(self, out, kind, scale):\n\
             \x20       out.write((\"%s|%s|%d\" % (self.content, kind, scale)).encode(\"utf-8\"))\n\
             \n\
             def make(content, error=None):\n\
             \x20   return _Qr(content)\n",
        )
        .unwrap();

        let content = "hello \"world\"\\\nsecond ${kind} line";
        let program = crate::program::render(&crate::program::ProgramParams {
            content,
            scale: 4,
            kind: qraft_core::OutputKind::Gif,
            background: None,
        });
        let source = format!(
            "import sys\nsys.path.insert(0, \"{}\")\n{program}",
            crate::program::escape_python_string(&modules.path().to_string_lossy())
        );

        let value = interpreter.run_python(&source).await.unwrap().unwrap();
        let result: qraft_core::GenerationResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.content, content);
        assert_eq!(result.description.as_deref(), Some("QR code in GIF format"));
        assert!(result.url.starts_with("data:image/gif;base64,"));
        assert!(result.url.contains("#t="));

        let decoded = qraft_core::data_uri::decode(&result.url).unwrap();
        assert_eq!(decoded.bytes, format!("{content}|gif|4").into_bytes());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr = b"1\n2\n3\n4\n5\n6\n7";
        assert_eq!(stderr_tail(stderr), "3\n4\n5\n6\n7");
    }
}
