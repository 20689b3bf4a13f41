//! # 协作式截止时间
//!
//! 弛豫循环在每一步之前检查截止时间；过期则返回 `LamOptError::Timeout`。
//! 无法打断一次正在进行的计算器调用，只在步与步之间生效。

use crate::error::{LamOptError, Result};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    /// 从现在起 `limit` 后过期
    pub fn after(limit: Duration) -> Self {
        Deadline {
            start: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// 过期时返回超时错误
    pub fn check(&self) -> Result<()> {
        let elapsed = self.elapsed();
        if elapsed >= self.limit {
            Err(LamOptError::Timeout { elapsed })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        let generous = Deadline::after(Duration::from_secs(3600));
        assert!(!generous.expired());
        assert!(generous.check().is_ok());

        let spent = Deadline::after(Duration::ZERO);
        assert!(spent.expired());
        assert!(matches!(spent.check(), Err(LamOptError::Timeout { .. })));
    }
}
