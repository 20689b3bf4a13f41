//! # 文件收集器
//!
//! 根据输入路径和模式收集待处理文件列表。
//!
//! ## 功能
//! - 支持单文件和目录输入
//! - glob 模式匹配（逗号分隔多模式）
//! - 递归目录搜索，结果按路径排序
//!
//! ## 依赖关系
//! - 被 `batch/pipeline.rs`, `commands/` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{LamOptError, Result};

use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 默认匹配模式
pub const DEFAULT_PATTERN: &str = "*.cif";

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    input: PathBuf,
    /// 匹配模式列表
    patterns: Vec<String>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的文件收集器（默认递归匹配 `*.cif`）
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            patterns: vec![DEFAULT_PATTERN.to_string()],
            recursive: true,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.patterns = pattern
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if self.patterns.is_empty() {
            self.patterns = vec![DEFAULT_PATTERN.to_string()];
        }
        self
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有匹配的文件
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        if self.input.is_file() {
            return Ok(vec![self.input.clone()]);
        }

        if !self.input.is_dir() {
            return Err(LamOptError::DirectoryNotFound {
                path: self.input.display().to_string(),
            });
        }

        let patterns = self
            .patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| LamOptError::InvalidArgument(format!("pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files: Vec<PathBuf> = WalkDir::new(&self.input)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|entry| Self::matches_any(&patterns, entry.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        Ok(files)
    }

    /// 检查文件名是否匹配任一模式
    fn matches_any(patterns: &[Pattern], path: &Path) -> bool {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        patterns.iter().any(|p| p.matches(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_pattern_matching() {
        let patterns = vec![Pattern::new("*.cif").unwrap(), Pattern::new("POSCAR?").unwrap()];
        assert!(FileCollector::matches_any(&patterns, Path::new("a/NaCl.cif")));
        assert!(FileCollector::matches_any(&patterns, Path::new("POSCAR1")));
        assert!(!FileCollector::matches_any(&patterns, Path::new("NaCl.cif.bak")));
        assert!(!FileCollector::matches_any(&patterns, Path::new("POSCAR12")));
    }

    #[test]
    fn test_collect_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("b.cif"), "").unwrap();
        fs::write(dir.path().join("a.cif"), "").unwrap();
        fs::write(dir.path().join("sub/deeper/c.cif"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = FileCollector::new(dir.path()).collect().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.cif", "b.cif", "c.cif"]);

        let shallow = FileCollector::new(dir.path()).recursive(false).collect().unwrap();
        assert_eq!(shallow.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = FileCollector::new("/nonexistent/lamopt-input").collect();
        assert!(matches!(result, Err(LamOptError::DirectoryNotFound { .. })));
    }
}
