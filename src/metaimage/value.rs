//! Typed tag values and their text coercion.
//!
//! [`decode`] turns header text into a [`TagValue`] according to the tag's
//! [`Category`]; [`TagValue::encode`] is the exact inverse.
//!
//! Matrix tags are stored in the file row-major and transposed into memory,
//! so `Matrix::get(r, c)` of a decoded `Orientation` equals file value
//! `c * n + r`. Encoding transposes back, making round-trips exact.

use super::tags::{Category, ElementType, Tag};
use crate::error::{Error, Result};
use std::path::PathBuf;

/// Square float matrix in in-memory (row, column) order.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    order: usize,
    values: Vec<f64>,
}

impl Matrix {
    /// Build from row-major in-memory values.
    pub fn new(order: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != order * order {
            return Err(Error::InvalidAffine(format!(
                "{} values do not form a {order}x{order} matrix",
                values.len()
            )));
        }
        Ok(Self { order, values })
    }

    /// Identity matrix of the given order.
    pub fn identity(order: usize) -> Self {
        let mut values = vec![0.0; order * order];
        for i in 0..order {
            values[i * order + i] = 1.0;
        }
        Self { order, values }
    }

    /// Build from fixed-size rows.
    pub fn from_rows<const N: usize>(rows: [[f64; N]; N]) -> Self {
        Self {
            order: N,
            values: rows.iter().flatten().copied().collect(),
        }
    }

    /// Matrix order (rows == columns).
    pub fn order(&self) -> usize {
        self.order
    }

    /// Element at (row, column).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.order + col]
    }

    /// Row-major in-memory values.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Interpret file values (row-major) and transpose into memory order.
    pub(crate) fn from_file_values(values: Vec<f64>) -> Option<Self> {
        let order = (values.len() as f64).sqrt().round() as usize;
        if order * order != values.len() {
            return None;
        }
        let mut transposed = vec![0.0; values.len()];
        for r in 0..order {
            for c in 0..order {
                transposed[c * order + r] = values[r * order + c];
            }
        }
        Some(Self {
            order,
            values: transposed,
        })
    }

    /// Values in file order (inverse of [`Matrix::from_file_values`]).
    pub(crate) fn file_values(&self) -> Vec<f64> {
        let n = self.order;
        (0..n * n).map(|i| self.values[(i % n) * n + i / n]).collect()
    }
}

/// Numbered data-file pattern: `format start stop [step]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    /// printf-style format with one integer conversion.
    pub format: String,
    /// First index.
    pub start: i64,
    /// Last index (inclusive).
    pub stop: i64,
    /// Index increment; never zero.
    pub step: i64,
}

impl FilePattern {
    /// Create a pattern, rejecting a zero step or a format without a conversion.
    pub fn new(format: impl Into<String>, start: i64, stop: i64, step: i64) -> Result<Self> {
        let format = format.into();
        if step == 0 || format_index(&format, start).is_none() {
            return Err(Error::invalid_value(
                Tag::ElementDataFile.name(),
                format!("{format} {start} {stop} {step}"),
            ));
        }
        Ok(Self {
            format,
            start,
            stop,
            step,
        })
    }

    /// Number of indices the pattern spans.
    pub fn len(&self) -> u64 {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let span = (stop - start) / step;
        if span < 0 {
            0
        } else {
            (span + 1) as u64
        }
    }

    /// Whether the pattern spans no index.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concrete file names, one per index.
    pub fn expand(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut index = self.start;
        while (self.step > 0 && index <= self.stop) || (self.step < 0 && index >= self.stop) {
            if let Some(name) = format_index(&self.format, index) {
                paths.push(PathBuf::from(name));
            }
            index = match index.checked_add(self.step) {
                Some(next) => next,
                None => break,
            };
        }
        paths
    }

    fn parse(text: &str) -> Option<Self> {
        if !text.contains('%') {
            return None;
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if !(3..=4).contains(&tokens.len()) {
            return None;
        }
        let start = tokens[1].parse().ok()?;
        let stop = tokens[2].parse().ok()?;
        let step = match tokens.get(3) {
            Some(step) => step.parse().ok()?,
            None => 1,
        };
        Self::new(tokens[0], start, stop, step).ok()
    }
}

/// Render one printf integer conversion (`%[flags][width](d|i|u|x|X|o)`).
///
/// Returns `None` when the format holds no conversion or more than one.
fn format_index(format: &str, index: i64) -> Option<String> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars().peekable();
    let mut converted = false;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        if converted {
            return None;
        }

        let (mut zero, mut left, mut plus, mut space) = (false, false, false, false);
        while let Some(&flag) = chars.peek() {
            match flag {
                '0' => zero = true,
                '-' => left = true,
                '+' => plus = true,
                ' ' => space = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + digit as usize;
            chars.next();
        }

        let magnitude = index.unsigned_abs();
        let digits = match chars.next()? {
            'd' | 'i' | 'u' => magnitude.to_string(),
            'x' => format!("{magnitude:x}"),
            'X' => format!("{magnitude:X}"),
            'o' => format!("{magnitude:o}"),
            _ => return None,
        };
        let sign = if index < 0 {
            "-"
        } else if plus {
            "+"
        } else if space {
            " "
        } else {
            ""
        };

        let len = sign.len() + digits.len();
        let pad = width.saturating_sub(len);
        if left {
            out.push_str(&format!("{sign}{digits}{:pad$}", ""));
        } else if zero {
            out.push_str(&format!("{sign}{:0>pad$}{digits}", ""));
        } else {
            out.push_str(&format!("{:pad$}{sign}{digits}", ""));
        }
        converted = true;
    }

    converted.then_some(out)
}

/// Where the binary payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFile {
    /// Appended to the header file itself.
    Local,
    /// One sibling (or absolute) file.
    Single(PathBuf),
    /// One file per slice, listed explicitly.
    List(Vec<PathBuf>),
    /// One file per slice, generated from a numbered pattern.
    Pattern(FilePattern),
}

impl DataFile {
    /// Number of file names, counted without expanding a pattern.
    pub fn file_count(&self) -> u64 {
        match self {
            Self::Local => 0,
            Self::Single(_) => 1,
            Self::List(paths) => paths.len() as u64,
            Self::Pattern(pattern) => pattern.len(),
        }
    }

    /// File names in slice order; `Local` yields none.
    pub fn file_names(&self) -> Vec<PathBuf> {
        match self {
            Self::Local => Vec::new(),
            Self::Single(path) => vec![path.clone()],
            Self::List(paths) => paths.clone(),
            Self::Pattern(pattern) => pattern.expand(),
        }
    }

    fn parse(text: &str) -> Self {
        let upper = text.trim().to_ascii_uppercase();
        let mut tokens = upper.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some("LOCAL"), None, _) => Self::Local,
            (Some("LIST"), None, _) => Self::List(Vec::new()),
            (Some("LIST"), Some(dims), None) if dims.ends_with('D') => Self::List(Vec::new()),
            _ => match FilePattern::parse(text) {
                Some(pattern) => Self::Pattern(pattern),
                None => Self::Single(PathBuf::from(text.trim())),
            },
        }
    }

    fn encode(&self) -> String {
        match self {
            Self::Local => "LOCAL".to_string(),
            Self::Single(path) => path.display().to_string(),
            Self::List(paths) => {
                let mut text = String::from("LIST");
                for path in paths {
                    text.push('\n');
                    text.push_str(&path.display().to_string());
                }
                text
            }
            Self::Pattern(p) => format!("{} {} {} {}", p.format, p.start, p.stop, p.step),
        }
    }
}

/// A typed tag value; one variant per [`Category`].
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Free text.
    Text(String),
    /// Unsigned integer.
    Integer(u64),
    /// Boolean flag.
    Boolean(bool),
    /// Single float.
    Float(f64),
    /// Float sequence.
    FloatVector(Vec<f64>),
    /// Unsigned integer sequence.
    IntegerVector(Vec<u64>),
    /// Square float matrix.
    Matrix(Matrix),
    /// Element type code.
    ElementType(ElementType),
    /// Data-file reference.
    DataFile(DataFile),
}

impl TagValue {
    /// Category this value belongs to.
    pub fn category(&self) -> Category {
        match self {
            Self::Text(_) => Category::Text,
            Self::Integer(_) => Category::Integer,
            Self::Boolean(_) => Category::Boolean,
            Self::Float(_) => Category::Float,
            Self::FloatVector(_) => Category::FloatVector,
            Self::IntegerVector(_) => Category::IntegerVector,
            Self::Matrix(_) => Category::FloatMatrix,
            Self::ElementType(_) => Category::ElementType,
            Self::DataFile(_) => Category::DataFile,
        }
    }

    /// Canonical header text for this value.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(v) => v.to_string(),
            Self::Boolean(true) => "TRUE".to_string(),
            Self::Boolean(false) => "FALSE".to_string(),
            Self::Float(v) => v.to_string(),
            Self::FloatVector(values) => join(values),
            Self::IntegerVector(values) => join(values),
            Self::Matrix(matrix) => join(&matrix.file_values()),
            Self::ElementType(ty) => ty.code().to_string(),
            Self::DataFile(file) => file.encode(),
        }
    }

    /// Text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer value.
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload for scalar floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Float sequence payload.
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::FloatVector(values) => Some(values),
            _ => None,
        }
    }

    /// Integer sequence payload.
    pub fn as_integers(&self) -> Option<&[u64]> {
        match self {
            Self::IntegerVector(values) => Some(values),
            _ => None,
        }
    }

    /// Matrix payload.
    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Self::Matrix(matrix) => Some(matrix),
            _ => None,
        }
    }

    /// Element type payload.
    pub fn as_element_type(&self) -> Option<ElementType> {
        match self {
            Self::ElementType(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Data-file payload.
    pub fn as_data_file(&self) -> Option<&DataFile> {
        match self {
            Self::DataFile(file) => Some(file),
            _ => None,
        }
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_all<T: std::str::FromStr>(tag: Tag, text: &str) -> Result<Vec<T>> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| Error::invalid_value(tag.name(), text))
        })
        .collect()
}

/// Decode header text for `tag`.
pub fn decode(tag: Tag, text: &str) -> Result<TagValue> {
    let text = text.trim();
    let invalid = || Error::invalid_value(tag.name(), text);
    Ok(match tag.category() {
        Category::Text => TagValue::Text(text.to_string()),
        Category::Integer => TagValue::Integer(text.parse().map_err(|_| invalid())?),
        Category::Boolean => TagValue::Boolean(text.eq_ignore_ascii_case("TRUE")),
        Category::Float => TagValue::Float(text.parse().map_err(|_| invalid())?),
        Category::FloatVector => TagValue::FloatVector(parse_all(tag, text)?),
        Category::IntegerVector => TagValue::IntegerVector(parse_all(tag, text)?),
        Category::FloatMatrix => {
            TagValue::Matrix(Matrix::from_file_values(parse_all(tag, text)?).ok_or_else(invalid)?)
        }
        Category::ElementType => TagValue::ElementType(ElementType::from_code(text)?),
        Category::DataFile => TagValue::DataFile(DataFile::parse(text)),
    })
}

/// Bring a caller-supplied value into `tag`'s category.
///
/// Text is decoded as if read from a header; integers widen to floats. Text
/// tags accept any value in its encoded form.
///
/// Text and file names holding a line break are rejected, since each header
/// entry is one line.
pub fn coerce(tag: Tag, value: TagValue) -> Result<TagValue> {
    let category = tag.category();
    let value = if value.category() == category {
        value
    } else {
        match (category, value) {
            (Category::Text, other) => TagValue::Text(other.encode()),
            (_, TagValue::Text(text)) => decode(tag, &text)?,
            (Category::Float, TagValue::Integer(v)) => TagValue::Float(v as f64),
            (Category::FloatVector, TagValue::IntegerVector(values)) => {
                TagValue::FloatVector(values.into_iter().map(|v| v as f64).collect())
            }
            (_, other) => return Err(Error::invalid_value(tag.name(), other.encode())),
        }
    };

    let multiline = match &value {
        TagValue::Text(text) => breaks_line(text),
        TagValue::DataFile(DataFile::Single(path)) => breaks_line(&path.to_string_lossy()),
        TagValue::DataFile(DataFile::List(paths)) => {
            paths.iter().any(|path| breaks_line(&path.to_string_lossy()))
        }
        TagValue::DataFile(DataFile::Pattern(pattern)) => breaks_line(&pattern.format),
        _ => false,
    };
    if multiline {
        return Err(Error::invalid_value(tag.name(), value.encode()));
    }
    Ok(value)
}

/// Whether `text` would spill onto a second header line.
pub(crate) fn breaks_line(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

impl From<&str> for TagValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TagValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        Self::Integer(u64::from(v))
    }
}

impl From<usize> for TagValue {
    fn from(v: usize) -> Self {
        Self::Integer(v as u64)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<f64>> for TagValue {
    fn from(values: Vec<f64>) -> Self {
        Self::FloatVector(values)
    }
}

impl From<&[f64]> for TagValue {
    fn from(values: &[f64]) -> Self {
        Self::FloatVector(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for TagValue {
    fn from(values: [f64; N]) -> Self {
        Self::FloatVector(values.to_vec())
    }
}

impl From<Vec<u64>> for TagValue {
    fn from(values: Vec<u64>) -> Self {
        Self::IntegerVector(values)
    }
}

impl From<Vec<usize>> for TagValue {
    fn from(values: Vec<usize>) -> Self {
        Self::IntegerVector(values.into_iter().map(|v| v as u64).collect())
    }
}

impl From<Matrix> for TagValue {
    fn from(matrix: Matrix) -> Self {
        Self::Matrix(matrix)
    }
}

impl From<ElementType> for TagValue {
    fn from(ty: ElementType) -> Self {
        Self::ElementType(ty)
    }
}

impl From<DataFile> for TagValue {
    fn from(file: DataFile) -> Self {
        Self::DataFile(file)
    }
}
