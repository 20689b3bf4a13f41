//! # 数据模型模块
//!
//! 定义统一的晶体结构数据模型与元素数据。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calculators/`, `relax/`, `analysis/` 使用
//! - 子模块: structure, element

pub mod element;
pub mod structure;

pub use element::Element;
pub use structure::{Atom, Crystal, Lattice};
