//! # 输出文件校验
//!
//! 在独立子进程中重新解析刚写出的结构文件，限定墙钟时间：
//! - 正常退出且状态码为 0：保留
//! - 非 0 退出：删除，原因取自子进程 stderr 的最后一行
//! - 超时：强制结束子进程并回收，删除文件
//! - 校验器无法启动：按拒绝处理，删除文件，批量流程继续
//!
//! 默认校验器是重新调用当前可执行文件的隐藏子命令 `lamopt validate-cif <path>`，
//! 解析器卡死或崩溃不会影响主进程。
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs`, `commands/relax.rs` 使用
//! - 子进程侧见 `commands/validate.rs`

use crate::error::{LamOptError, Result};

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 默认校验超时
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(3);

/// 子命令名
pub const VALIDATE_SUBCOMMAND: &str = "validate-cif";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 拒绝原因最多保留的字符数
const MAX_REASON_CHARS: usize = 200;

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(String),
    TimedOut,
    /// 文件不存在（例如已被先前的校验删除）
    Missing,
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOutcome::Accepted => write!(f, "accepted"),
            ValidationOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            ValidationOutcome::TimedOut => write!(f, "timed out"),
            ValidationOutcome::Missing => write!(f, "file missing"),
        }
    }
}

/// 子进程校验器
#[derive(Debug, Clone)]
pub struct ValidationGuard {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ValidationGuard {
    /// 以 `program args... <path>` 的形式调用校验器
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, timeout: Duration) -> Self {
        ValidationGuard {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// 重新调用当前可执行文件的 `validate-cif` 子命令
    pub fn for_current_exe(timeout: Duration) -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| LamOptError::ValidatorSpawn {
            command: "current executable".to_string(),
            source: e,
        })?;
        Ok(ValidationGuard::new(
            program,
            vec![OsString::from(VALIDATE_SUBCOMMAND)],
            timeout,
        ))
    }

    /// 在子进程中校验文件，不修改文件
    pub fn validate(&self, path: &Path) -> Result<ValidationOutcome> {
        if !path.is_file() {
            return Ok(ValidationOutcome::Missing);
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LamOptError::ValidatorSpawn {
                command: self.program.display().to_string(),
                source: e,
            })?;

        // stderr 必须边运行边读，写满管道的子进程会一直阻塞
        let last_line = child.stderr.take().map(drain_last_line);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= self.timeout => {
                    // kill 之后必须 wait，否则留下僵尸进程
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!("validator for {} killed after {:?}", path.display(), self.timeout);
                    return Ok(ValidationOutcome::TimedOut);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(ValidationOutcome::Rejected(format!("wait failed: {}", e)));
                }
            }
        };

        if status.success() {
            return Ok(ValidationOutcome::Accepted);
        }

        // 子进程留下的孙进程可能仍持有管道，最多再等一个超时
        let reason = last_line
            .and_then(|rx| rx.recv_timeout(self.timeout).ok())
            .flatten()
            .unwrap_or_else(|| match status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            });
        Ok(ValidationOutcome::Rejected(reason))
    }

    /// 校验并在未通过时删除文件
    ///
    /// 校验器无法启动时按拒绝处理，只影响这一个文件。
    pub fn guard(&self, path: &Path) -> ValidationOutcome {
        let outcome = match self.validate(path) {
            Ok(outcome) => outcome,
            Err(e) => ValidationOutcome::Rejected(e.to_string()),
        };
        match &outcome {
            ValidationOutcome::Accepted | ValidationOutcome::Missing => {}
            ValidationOutcome::Rejected(_) | ValidationOutcome::TimedOut => {
                warn!("Removing {}: validation {}", path.display(), outcome);
                if let Err(e) = fs::remove_file(path) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", path.display(), e);
                    }
                }
            }
        }
        outcome
    }
}

/// 在后台线程读完 stderr，只保留最后一个非空行
fn drain_last_line(pipe: ChildStderr) -> mpsc::Receiver<Option<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        let mut last = None;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if !line.is_empty() {
                        last = Some(line.chars().take(MAX_REASON_CHARS).collect());
                    }
                }
            }
        }
        let _ = tx.send(last);
    });
    rx
}
