//! # CIF 格式解析器
//!
//! 读取与写出 Crystallographic Information File。
//!
//! ## 支持范围
//! ```text
//! data_NaCl
//! _cell_length_a    5.64(1)         # 允许标准不确定度
//! _cell_angle_alpha 90
//! loop_
//! _symmetry_equiv_pos_as_xyz        # 或 _space_group_symop_operation_xyz
//!   'x, y, z'
//!   '-x+1/2, y, -z'
//! loop_
//! _atom_site_label
//! _atom_site_type_symbol
//! _atom_site_fract_x
//! _atom_site_fract_y
//! _atom_site_fract_z
//! _atom_site_occupancy
//!   Na1 Na 0 0 0 1
//! ```
//! - 只读取第一个 `data_` 块
//! - 对原子位点施加全部对称操作并合并重合位点
//! - 部分占位（无序结构）视为错误
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `batch/`, `commands/validate.rs` 使用
//! - 使用 `models/structure.rs`, `models/element.rs`

use crate::error::{LamOptError, Result};
use crate::models::element::normalize_symbol;
use crate::models::{Atom, Crystal, Lattice};

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// 对称操作生成位点的合并容差 (Å)
const MERGE_TOLERANCE: f64 = 0.01;

/// 校验时允许的最短原子间距 (Å)
pub const MIN_INTERATOMIC_DISTANCE: f64 = 0.5;

/// 解析 CIF 文件
pub fn parse_cif_file(path: &Path) -> Result<Crystal> {
    let content = read_cif(path)?;
    parse_cif_content(&content, &stem_of(path))
}

/// 从字符串内容解析 CIF
pub fn parse_cif_content(content: &str, default_name: &str) -> Result<Crystal> {
    let block = CifBlock::parse(content).map_err(|reason| parse_error(default_name, reason))?;
    block.to_crystal(default_name)
}

/// 解析并做结构合理性检查（输出文件校验使用）
pub fn read_checked(path: &Path) -> Result<Crystal> {
    let content = read_cif(path)?;
    let name = stem_of(path);
    let block = CifBlock::parse(&content).map_err(|reason| parse_error(&name, reason))?;
    let crystal = block.to_crystal(&name)?;
    check_structure(&crystal, block.declared_formula())?;
    Ok(crystal)
}

fn read_cif(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| LamOptError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn parse_error(name: &str, reason: impl Into<String>) -> LamOptError {
    LamOptError::ParseError {
        format: "cif".to_string(),
        path: name.to_string(),
        reason: reason.into(),
    }
}

// ─────────────────────────────────────────────────────────────
// 词法与数据块
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_tag(&self) -> bool {
        !self.quoted && self.text.starts_with('_')
    }

    fn is_reserved(&self) -> bool {
        if self.quoted {
            return false;
        }
        let lower = self.text.to_lowercase();
        lower == "loop_" || lower.starts_with("data_") || lower.starts_with("save_")
    }
}

fn tokenize(content: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        // 分号文本块
        if let Some(rest) = line.strip_prefix(';') {
            let mut text = rest.to_string();
            let mut closed = false;
            for next in lines.by_ref() {
                if next.starts_with(';') {
                    closed = true;
                    break;
                }
                text.push('\n');
                text.push_str(next);
            }
            if !closed {
                return Err("Unterminated ';' text field".to_string());
            }
            tokens.push(Token {
                text: text.trim().to_string(),
                quoted: true,
            });
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c == '#' {
                break;
            } else if c == '\'' || c == '"' {
                // 引号只在其后跟空白或行尾时闭合
                let quote = c;
                let start = i + 1;
                let mut end = None;
                let mut j = start;
                while j < chars.len() {
                    if chars[j] == quote && (j + 1 == chars.len() || chars[j + 1].is_whitespace())
                    {
                        end = Some(j);
                        break;
                    }
                    j += 1;
                }
                let end = end.ok_or_else(|| format!("Unterminated quoted string: {}", line))?;
                tokens.push(Token {
                    text: chars[start..end].iter().collect(),
                    quoted: true,
                });
                i = end + 1;
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                tokens.push(Token {
                    text: chars[start..i].iter().collect(),
                    quoted: false,
                });
            }
        }
    }

    Ok(tokens)
}

/// loop_ 表格
#[derive(Debug, Clone, Default)]
struct CifLoop {
    tags: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CifLoop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }
}

/// 单个 data_ 数据块
#[derive(Debug, Clone, Default)]
pub struct CifBlock {
    name: Option<String>,
    items: HashMap<String, String>,
    loops: Vec<CifLoop>,
}

impl CifBlock {
    /// 解析第一个 data_ 块
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let tokens = tokenize(content)?;
        let mut block = CifBlock::default();
        let mut seen_data = false;
        let mut i = 0;

        while i < tokens.len() {
            let token = &tokens[i];
            let lower = token.text.to_lowercase();

            if !token.quoted && lower.starts_with("data_") {
                if seen_data {
                    break;
                }
                seen_data = true;
                block.name = Some(token.text[5..].to_string());
                i += 1;
            } else if !token.quoted && lower == "loop_" {
                i += 1;
                let mut lp = CifLoop::default();
                while i < tokens.len() && tokens[i].is_tag() {
                    lp.tags.push(tokens[i].text.to_lowercase());
                    i += 1;
                }
                if lp.tags.is_empty() {
                    return Err("loop_ without tags".to_string());
                }
                let mut values = Vec::new();
                while i < tokens.len() && !tokens[i].is_tag() && !tokens[i].is_reserved() {
                    values.push(tokens[i].text.clone());
                    i += 1;
                }
                if values.len() % lp.tags.len() != 0 {
                    return Err(format!(
                        "loop with {} tags has {} values",
                        lp.tags.len(),
                        values.len()
                    ));
                }
                lp.rows = values
                    .chunks(lp.tags.len())
                    .map(|chunk| chunk.to_vec())
                    .collect();
                block.loops.push(lp);
            } else if token.is_tag() {
                let value = tokens
                    .get(i + 1)
                    .filter(|v| !v.is_tag() && !v.is_reserved())
                    .ok_or_else(|| format!("Tag {} has no value", token.text))?;
                block.items.insert(lower, value.text.clone());
                i += 2;
            } else {
                // 容忍全局块/save 帧等不识别的内容
                i += 1;
            }
        }

        if !seen_data {
            return Err("No data_ block found".to_string());
        }
        Ok(block)
    }

    fn number(&self, tag: &str) -> Option<f64> {
        self.items.get(tag).and_then(|v| parse_number(v))
    }

    fn find_loop(&self, tag: &str) -> Option<&CifLoop> {
        self.loops.iter().find(|l| l.column(tag).is_some())
    }

    /// 文件声明的化学式（`_chemical_formula_sum`）
    pub fn declared_formula(&self) -> Option<&str> {
        self.items
            .get("_chemical_formula_sum")
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty() && *s != "?" && *s != ".")
    }

    /// 对称操作列表；缺省时为恒等操作
    fn symmetry_operations(&self) -> std::result::Result<Vec<SymOp>, String> {
        const SYMOP_TAGS: [&str; 2] = [
            "_symmetry_equiv_pos_as_xyz",
            "_space_group_symop_operation_xyz",
        ];

        for tag in SYMOP_TAGS {
            if let Some(lp) = self.find_loop(tag) {
                let col = lp.column(tag).unwrap_or(0);
                return lp.rows.iter().map(|row| SymOp::parse(&row[col])).collect();
            }
            if let Some(op) = self.items.get(tag) {
                return Ok(vec![SymOp::parse(op)?]);
            }
        }
        Ok(vec![SymOp::identity()])
    }

    /// 转换为晶体结构
    pub fn to_crystal(&self, default_name: &str) -> Result<Crystal> {
        let name = self
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name.to_string());
        let err = |reason: String| parse_error(&name, reason);

        let mut params = [0.0; 6];
        let tags = [
            "_cell_length_a",
            "_cell_length_b",
            "_cell_length_c",
            "_cell_angle_alpha",
            "_cell_angle_beta",
            "_cell_angle_gamma",
        ];
        for (slot, tag) in params.iter_mut().zip(tags) {
            *slot = self
                .number(tag)
                .ok_or_else(|| err(format!("Missing or invalid {}", tag)))?;
        }
        let lattice =
            Lattice::from_parameters(params[0], params[1], params[2], params[3], params[4], params[5]);
        if !lattice.volume().is_finite() || lattice.volume().abs() < 1e-6 {
            return Err(err("Degenerate cell parameters".to_string()));
        }

        let sites = self
            .find_loop("_atom_site_fract_x")
            .ok_or_else(|| err("Missing _atom_site_fract_x loop".to_string()))?;
        let col = |tag: &str| sites.column(tag);
        let (cx, cy, cz) = match (
            col("_atom_site_fract_x"),
            col("_atom_site_fract_y"),
            col("_atom_site_fract_z"),
        ) {
            (Some(x), Some(y), Some(z)) => (x, y, z),
            _ => return Err(err("Incomplete fractional coordinate columns".to_string())),
        };
        let c_type = col("_atom_site_type_symbol");
        let c_label = col("_atom_site_label");
        let c_occ = col("_atom_site_occupancy");
        if c_type.is_none() && c_label.is_none() {
            return Err(err("Atom sites carry neither type symbol nor label".to_string()));
        }

        let ops = self.symmetry_operations().map_err(err)?;
        let mut atoms: Vec<Atom> = Vec::new();

        for row in &sites.rows {
            let raw_symbol = c_type.or(c_label).map(|c| row[c].as_str()).unwrap_or("");
            let element = normalize_symbol(raw_symbol)?;
            let label = c_label.map(|c| row[c].clone());

            if let Some(c) = c_occ {
                let occ = parse_number(&row[c]).unwrap_or(1.0);
                if (occ - 1.0).abs() > 1e-3 {
                    return Err(err(format!(
                        "Partial occupancy {} on site {}",
                        occ,
                        label.as_deref().unwrap_or(element)
                    )));
                }
            }

            let frac = [
                parse_number(&row[cx]),
                parse_number(&row[cy]),
                parse_number(&row[cz]),
            ];
            let frac = match frac {
                [Some(x), Some(y), Some(z)] => [x, y, z],
                _ => return Err(err(format!("Invalid coordinates for site {}", raw_symbol))),
            };

            for op in &ops {
                let position = wrap(op.apply(frac));
                match atoms.iter().find(|a| {
                    lattice.periodic_distance(a.position, position) < MERGE_TOLERANCE
                }) {
                    Some(existing) if existing.element != element => {
                        return Err(err(format!(
                            "Sites of {} and {} overlap",
                            existing.element, element
                        )));
                    }
                    Some(_) => {}
                    None => {
                        let mut atom = Atom::new(element, position);
                        atom.label = label.clone();
                        atoms.push(atom);
                    }
                }
            }
        }

        let mut crystal = Crystal::new(name, lattice, atoms);
        crystal.source_format = Some("cif".to_string());
        Ok(crystal)
    }
}

/// 解析带标准不确定度的数字，如 `5.64(2)`；`?` 与 `.` 视为缺失
fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "?" || trimmed == "." {
        return None;
    }
    let numeric = trimmed.split('(').next().unwrap_or(trimmed);
    numeric.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn wrap(frac: [f64; 3]) -> [f64; 3] {
    let mut out = frac;
    for x in out.iter_mut() {
        *x -= x.floor();
        if (*x - 1.0).abs() < 1e-10 {
            *x = 0.0;
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────
// 对称操作
// ─────────────────────────────────────────────────────────────

/// 形如 `-x+1/2, y, z` 的对称操作：旋转矩阵 + 平移
#[derive(Debug, Clone, PartialEq)]
struct SymOp {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

fn symop_term_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([+-]?)(?:(\d*\.?\d+(?:/\d*\.?\d+)?)\*?([xyz])?|([xyz]))")
            .expect("valid symmetry-operation pattern")
    })
}

impl SymOp {
    fn identity() -> Self {
        SymOp {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    fn parse(op: &str) -> std::result::Result<Self, String> {
        let parts: Vec<String> = op
            .split(',')
            .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .map(|p| p.to_lowercase())
            .collect();
        if parts.len() != 3 {
            return Err(format!("Invalid symmetry operation '{}'", op));
        }

        let mut symop = SymOp {
            rotation: [[0.0; 3]; 3],
            translation: [0.0; 3],
        };

        for (row, part) in parts.iter().enumerate() {
            let mut covered = 0;
            for caps in symop_term_regex().captures_iter(part) {
                covered += caps.get(0).map_or(0, |m| m.len());
                let sign = if caps.get(1).map_or("", |m| m.as_str()) == "-" {
                    -1.0
                } else {
                    1.0
                };
                let axis = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str());
                let coefficient = match caps.get(2) {
                    Some(m) => parse_fraction(m.as_str())
                        .ok_or_else(|| format!("Invalid number in '{}'", op))?,
                    None => 1.0,
                };
                match axis {
                    Some(letter) => {
                        let col = match letter {
                            "x" => 0,
                            "y" => 1,
                            _ => 2,
                        };
                        symop.rotation[row][col] += sign * coefficient;
                    }
                    None => symop.translation[row] += sign * coefficient,
                }
            }
            if covered != part.len() || part.is_empty() {
                return Err(format!("Invalid symmetry operation '{}'", op));
            }
        }

        Ok(symop)
    }

    fn apply(&self, frac: [f64; 3]) -> [f64; 3] {
        let r = self.rotation;
        let t = self.translation;
        [
            r[0][0] * frac[0] + r[0][1] * frac[1] + r[0][2] * frac[2] + t[0],
            r[1][0] * frac[0] + r[1][1] * frac[1] + r[1][2] * frac[2] + t[1],
            r[2][0] * frac[0] + r[2][1] * frac[1] + r[2][2] * frac[2] + t[2],
        ]
    }
}

fn parse_fraction(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num.parse::<f64>().ok()? / den)
        }
        None => s.parse().ok(),
    }
}

// ─────────────────────────────────────────────────────────────
// 合理性检查
// ─────────────────────────────────────────────────────────────

/// 结构合理性检查
///
/// - 至少一个原子，晶胞体积有限且为正
/// - 坐标有限，原子间距不小于 [`MIN_INTERATOMIC_DISTANCE`]
/// - 若声明了化学式，解析得到的组成须与之成比例一致
pub fn check_structure(crystal: &Crystal, declared_formula: Option<&str>) -> Result<()> {
    let invalid = |reason: String| LamOptError::InvalidStructure(format!("{}: {}", crystal.name, reason));

    if crystal.is_empty() {
        return Err(invalid("no atomic sites".to_string()));
    }
    let volume = crystal.volume();
    if !volume.is_finite() || volume <= 1e-6 {
        return Err(invalid(format!("non-physical cell volume {}", volume)));
    }
    if crystal
        .atoms
        .iter()
        .any(|a| a.position.iter().any(|x| !x.is_finite()))
    {
        return Err(invalid("non-finite coordinates".to_string()));
    }
    if let Some(d) = crystal.min_distance() {
        if d < MIN_INTERATOMIC_DISTANCE {
            return Err(invalid(format!("sites only {:.3} Å apart", d)));
        }
    }

    if let Some(formula) = declared_formula {
        let declared = parse_formula_sum(formula)
            .ok_or_else(|| invalid(format!("unreadable formula '{}'", formula)))?;
        let parsed: BTreeMap<String, f64> = crystal
            .composition()
            .into_iter()
            .map(|(el, n)| (el, n as f64))
            .collect();
        if !same_proportions(&declared, &parsed) {
            return Err(invalid(format!(
                "declared formula '{}' does not match parsed {}",
                formula,
                crystal.formula()
            )));
        }
    }

    Ok(())
}

/// 解析 `_chemical_formula_sum`，如 `"Na4 Cl4"`、`"Fe2 O3"`
fn parse_formula_sum(formula: &str) -> Option<BTreeMap<String, f64>> {
    let mut counts = BTreeMap::new();
    for token in formula.split_whitespace() {
        let split = token
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(token.len());
        let (symbol, amount) = token.split_at(split);
        let element = normalize_symbol(symbol).ok()?;
        let amount = if amount.is_empty() {
            1.0
        } else {
            amount.parse::<f64>().ok()?
        };
        *counts.entry(element.to_string()).or_insert(0.0) += amount;
    }
    (!counts.is_empty()).then_some(counts)
}

fn same_proportions(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> bool {
    if a.keys().ne(b.keys()) {
        return false;
    }
    let total_a: f64 = a.values().sum();
    let total_b: f64 = b.values().sum();
    a.iter()
        .zip(b.values())
        .all(|((_, x), y)| (x / total_a - y / total_b).abs() < 1e-3)
}

// ─────────────────────────────────────────────────────────────
// 写出
// ─────────────────────────────────────────────────────────────

/// 转换为 CIF 格式（P1）
pub fn to_cif_string(crystal: &Crystal) -> String {
    let (a, b, c, alpha, beta, gamma) = crystal.lattice.parameters();
    let composition = crystal.composition();
    let formula_sum = composition
        .iter()
        .map(|(el, n)| format!("{}{}", el, n))
        .collect::<Vec<_>>()
        .join(" ");

    let mut result = String::new();
    result.push_str(&format!("data_{}\n", crystal.name.replace(char::is_whitespace, "_")));
    result.push_str("_symmetry_space_group_name_H-M    'P 1'\n");
    result.push_str("_symmetry_Int_Tables_number       1\n");
    result.push_str(&format!(
        "_chemical_formula_structural      {}\n",
        crystal.reduced_formula()
    ));
    result.push_str(&format!("_chemical_formula_sum             '{}'\n\n", formula_sum));

    result.push_str(&format!("_cell_length_a    {:.8}\n", a));
    result.push_str(&format!("_cell_length_b    {:.8}\n", b));
    result.push_str(&format!("_cell_length_c    {:.8}\n", c));
    result.push_str(&format!("_cell_angle_alpha {:.8}\n", alpha));
    result.push_str(&format!("_cell_angle_beta  {:.8}\n", beta));
    result.push_str(&format!("_cell_angle_gamma {:.8}\n", gamma));
    result.push_str(&format!("_cell_volume      {:.8}\n\n", crystal.volume()));

    result.push_str("loop_\n");
    result.push_str(" _symmetry_equiv_pos_site_id\n");
    result.push_str(" _symmetry_equiv_pos_as_xyz\n");
    result.push_str("  1  'x, y, z'\n\n");

    result.push_str("loop_\n");
    result.push_str(" _atom_site_label\n");
    result.push_str(" _atom_site_type_symbol\n");
    result.push_str(" _atom_site_fract_x\n");
    result.push_str(" _atom_site_fract_y\n");
    result.push_str(" _atom_site_fract_z\n");
    result.push_str(" _atom_site_occupancy\n");

    for (i, atom) in crystal.atoms.iter().enumerate() {
        let label = atom
            .label
            .clone()
            .unwrap_or_else(|| format!("{}{}", atom.element, i + 1));
        result.push_str(&format!(
            "  {} {} {:.10} {:.10} {:.10} 1.0\n",
            label, atom.element, atom.position[0], atom.position[1], atom.position[2]
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::fixtures::rock_salt;

    const NACL_P1: &str = r#"# generated
data_NaCl
_symmetry_space_group_name_H-M 'P 1'
_cell_length_a 5.64(1)
_cell_length_b 5.64
_cell_length_c 5.64
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90
_chemical_formula_sum 'Na4 Cl4'
loop_
_atom_site_label
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
_atom_site_occupancy
Na1 Na 0.0 0.0 0.0 1
Na2 Na 0.5 0.5 0.0 1
Na3 Na 0.5 0.0 0.5 1
Na4 Na 0.0 0.5 0.5 1
Cl1 Cl- 0.5 0.0 0.0 1
Cl2 Cl- 0.0 0.5 0.0 1
Cl3 Cl- 0.0 0.0 0.5 1
Cl4 Cl- 0.5 0.5 0.5 1
"#;

    #[test]
    fn test_parse_p1() {
        let crystal = parse_cif_content(NACL_P1, "fallback").unwrap();
        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.atoms.len(), 8);
        assert_eq!(crystal.formula(), "Na4Cl4");
        assert!((crystal.volume() - 5.64f64.powi(3)).abs() < 1e-6);
        assert_eq!(crystal.atoms[4].element, "Cl");
        assert_eq!(crystal.atoms[4].label.as_deref(), Some("Cl1"));
    }

    #[test]
    fn test_symmetry_operations_expand_sites() {
        // Fm-3m 的面心平移子集足以生成完整岩盐胞
        let content = r#"data_rocksalt
_cell_length_a 5.64
_cell_length_b 5.64
_cell_length_c 5.64
_cell_angle_alpha 90.0
_cell_angle_beta 90.0
_cell_angle_gamma 90.0
loop_
_space_group_symop_operation_xyz
'x, y, z'
'x+1/2, y+1/2, z'
'x+1/2, y, z+1/2'
'x, y+1/2, z+1/2'
'-x, -y, -z'
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Na1 0 0 0
Cl1 0.5 0.5 0.5
"#;
        let crystal = parse_cif_content(content, "x").unwrap();
        assert_eq!(crystal.atoms.len(), 8);
        assert_eq!(crystal.composition().get("Na"), Some(&4));
        assert_eq!(crystal.composition().get("Cl"), Some(&4));
    }

    #[test]
    fn test_symop_parsing() {
        let op = SymOp::parse("-x+1/2, y-x, 0.25+z").unwrap();
        assert_eq!(op.rotation[0], [-1.0, 0.0, 0.0]);
        assert_eq!(op.rotation[1], [-1.0, 1.0, 0.0]);
        assert_eq!(op.translation, [0.5, 0.0, 0.25]);
        assert!(SymOp::parse("x, y").is_err());
        assert!(SymOp::parse("x, y, q").is_err());
    }

    #[test]
    fn test_partial_occupancy_rejected() {
        let content = NACL_P1.replace("Na1 Na 0.0 0.0 0.0 1", "Na1 Na 0.0 0.0 0.0 0.5");
        assert!(parse_cif_content(&content, "x").is_err());
    }

    #[test]
    fn test_missing_cell_is_error() {
        let content = NACL_P1.replace("_cell_length_b 5.64\n", "");
        assert!(matches!(
            parse_cif_content(&content, "x"),
            Err(LamOptError::ParseError { .. })
        ));
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_cif_content("this is not a cif", "x").is_err());
        assert!(parse_cif_content("data_x\nloop_\n_a\n_b\n1\n", "x").is_err());
    }

    #[test]
    fn test_multiline_text_field_and_second_block() {
        let content = format!(
            "{}\n_publ_section_title\n;\nSome title\nspanning lines\n;\ndata_second\n_cell_length_a 1\n",
            NACL_P1
        );
        let crystal = parse_cif_content(&content, "x").unwrap();
        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.atoms.len(), 8);
    }

    #[test]
    fn test_check_structure_formula_mismatch() {
        let content = NACL_P1.replace("'Na4 Cl4'", "'Na2 Cl4'");
        let block = CifBlock::parse(&content).unwrap();
        let crystal = block.to_crystal("x").unwrap();
        assert!(check_structure(&crystal, block.declared_formula()).is_err());

        let block = CifBlock::parse(NACL_P1).unwrap();
        let crystal = block.to_crystal("x").unwrap();
        assert!(check_structure(&crystal, block.declared_formula()).is_ok());
    }

    #[test]
    fn test_check_structure_overlap() {
        let mut crystal = rock_salt(5.64);
        crystal.atoms[1].position = [0.01, 0.0, 0.0];
        assert!(check_structure(&crystal, None).is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let mut crystal = rock_salt(5.64);
        crystal.lattice = Lattice::from_vectors([[5.6, 0.1, 0.0], [0.0, 5.7, 0.2], [0.3, 0.0, 5.8]]);
        let text = to_cif_string(&crystal);
        let parsed = parse_cif_content(&text, "x").unwrap();

        assert_eq!(parsed.atoms.len(), 8);
        assert!((parsed.volume() - crystal.volume()).abs() < 1e-5);
        let d_orig = crystal.min_distance().unwrap();
        let d_new = parsed.min_distance().unwrap();
        assert!((d_orig - d_new).abs() < 1e-6);

        let block = CifBlock::parse(&text).unwrap();
        assert_eq!(block.declared_formula(), Some("Cl4 Na4"));
        assert!(check_structure(&parsed, block.declared_formula()).is_ok());
    }
}
