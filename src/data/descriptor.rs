use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// DescriptorValue – a single cell in a descriptor column
// ---------------------------------------------------------------------------

/// A dynamically-typed descriptor value.
///
/// `Integer` and `Float` compare numerically against each other, so a time
/// coordinate stored as `Integer(2)` matches a bin edge given as `Float(2.0)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DescriptorValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Array-valued entry, only meaningful for dataset-level descriptors.
    List(Vec<DescriptorValue>),
    Null,
}

impl DescriptorValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DescriptorValue::Float(v) => Some(*v),
            DescriptorValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            DescriptorValue::Null => 0,
            DescriptorValue::Bool(_) => 1,
            DescriptorValue::Integer(_) | DescriptorValue::Float(_) => 2,
            DescriptorValue::String(_) => 3,
            DescriptorValue::List(_) => 4,
        }
    }
}

// -- Manual Eq/Ord/Hash so mixed numeric columns behave like numeric arrays --

impl PartialEq for DescriptorValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DescriptorValue {}

impl PartialOrd for DescriptorValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DescriptorValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use DescriptorValue::*;
        let (ra, rb) = (self.rank(), other.rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            (Float(a), Float(b)) => signless_zero(*a).total_cmp(&signless_zero(*b)),
            (Integer(a), Float(b)) => cmp_integer_float(*a, *b),
            (Float(a), Integer(b)) => cmp_integer_float(*b, *a).reverse(),
            _ => Ordering::Equal,
        }
    }
}

/// 2^63, the first float above every `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// `-0.0` and `0.0` are one value.
fn signless_zero(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x
    }
}

/// Exact comparison, no rounding of `i` through `f64`.
fn cmp_integer_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return (i as f64).total_cmp(&f);
    }
    if f >= I64_BOUND {
        return Ordering::Less;
    }
    if f < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if f > whole => Ordering::Less,
        Ordering::Equal if f < whole => Ordering::Greater,
        ord => ord,
    }
}

/// The `i64` a float is exactly equal to, if any.
fn exact_integer(f: f64) -> Option<i64> {
    (f.trunc() == f && (-I64_BOUND..I64_BOUND).contains(&f)).then(|| f as i64)
}

impl std::hash::Hash for DescriptorValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            DescriptorValue::String(s) => s.hash(state),
            DescriptorValue::Integer(i) => i.hash(state),
            DescriptorValue::Float(f) => match exact_integer(*f) {
                Some(i) => i.hash(state),
                None => signless_zero(*f).to_bits().hash(state),
            },
            DescriptorValue::Bool(b) => b.hash(state),
            DescriptorValue::List(items) => items.hash(state),
            DescriptorValue::Null => {}
        }
    }
}

impl fmt::Display for DescriptorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorValue::String(s) => write!(f, "{s}"),
            DescriptorValue::Integer(i) => write!(f, "{i}"),
            DescriptorValue::Float(v) => write!(f, "{v:.4}"),
            DescriptorValue::Bool(b) => write!(f, "{b}"),
            DescriptorValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            DescriptorValue::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for DescriptorValue {
    fn from(s: &str) -> Self {
        DescriptorValue::String(s.to_string())
    }
}

impl From<String> for DescriptorValue {
    fn from(s: String) -> Self {
        DescriptorValue::String(s)
    }
}

impl From<i64> for DescriptorValue {
    fn from(i: i64) -> Self {
        DescriptorValue::Integer(i)
    }
}

impl From<i32> for DescriptorValue {
    fn from(i: i32) -> Self {
        DescriptorValue::Integer(i64::from(i))
    }
}

impl From<f64> for DescriptorValue {
    fn from(v: f64) -> Self {
        DescriptorValue::Float(v)
    }
}

impl From<bool> for DescriptorValue {
    fn from(b: bool) -> Self {
        DescriptorValue::Bool(b)
    }
}

impl<T: Into<DescriptorValue>> From<Vec<T>> for DescriptorValue {
    fn from(items: Vec<T>) -> Self {
        DescriptorValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Collect anything convertible into a descriptor column.
pub fn column<T, I>(values: I) -> Vec<DescriptorValue>
where
    T: Into<DescriptorValue>,
    I: IntoIterator<Item = T>,
{
    values.into_iter().map(Into::into).collect()
}

// ---------------------------------------------------------------------------
// Selector – scalar equality or sequence membership
// ---------------------------------------------------------------------------

/// What a `subset_*` call matches descriptor entries against.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Value(DescriptorValue),
    AnyOf(Vec<DescriptorValue>),
}

impl Selector {
    pub fn matches(&self, value: &DescriptorValue) -> bool {
        match self {
            Selector::Value(v) => v == value,
            Selector::AnyOf(vs) => vs.contains(value),
        }
    }
}

impl From<DescriptorValue> for Selector {
    fn from(v: DescriptorValue) -> Self {
        Selector::Value(v)
    }
}

impl From<Vec<DescriptorValue>> for Selector {
    fn from(vs: Vec<DescriptorValue>) -> Self {
        Selector::AnyOf(vs)
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Selector::Value(s.into())
    }
}

impl From<i64> for Selector {
    fn from(i: i64) -> Self {
        Selector::Value(i.into())
    }
}

impl From<i32> for Selector {
    fn from(i: i32) -> Self {
        Selector::Value(i.into())
    }
}

impl From<f64> for Selector {
    fn from(v: f64) -> Self {
        Selector::Value(v.into())
    }
}

// ---------------------------------------------------------------------------
// DescriptorTable – named columns pinned to one axis length
// ---------------------------------------------------------------------------

/// Dataset-level metadata: free-floating, no length constraint.
pub type Descriptors = BTreeMap<String, DescriptorValue>;

/// Named descriptor columns co-indexed with one axis of the measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorTable(BTreeMap<String, Vec<DescriptorValue>>);

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<DescriptorValue>) -> Self {
        self.0.insert(name.into(), values);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: Vec<DescriptorValue>,
    ) -> Option<Vec<DescriptorValue>> {
        self.0.insert(name.into(), values)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<DescriptorValue>> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&[DescriptorValue]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get), failing with `UnknownDescriptor` naming `table`.
    pub fn require(&self, table: &'static str, name: &str) -> Result<&[DescriptorValue]> {
        self.get(name).ok_or_else(|| DatasetError::UnknownDescriptor {
            table,
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<DescriptorValue>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail unless every column has exactly `expected` entries.
    pub fn check_length(&self, table: &'static str, expected: usize) -> Result<()> {
        for (name, values) in &self.0 {
            if values.len() != expected {
                return Err(DatasetError::DescriptorLength {
                    table,
                    name: name.clone(),
                    expected,
                    found: values.len(),
                });
            }
        }
        Ok(())
    }

    /// Apply the same index selection (or permutation) to every column.
    pub fn subset(&self, indices: &[usize]) -> Self {
        self.0
            .iter()
            .map(|(name, values)| {
                let picked: Vec<DescriptorValue> = indices.iter().map(|&i| values[i].clone()).collect();
                (name.clone(), picked)
            })
            .collect()
    }
}

impl FromIterator<(String, Vec<DescriptorValue>)> for DescriptorTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<DescriptorValue>)>>(iter: I) -> Self {
        DescriptorTable(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Vec<DescriptorValue>>> for DescriptorTable {
    fn from(map: BTreeMap<String, Vec<DescriptorValue>>) -> Self {
        DescriptorTable(map)
    }
}

// ---------------------------------------------------------------------------
// Column utilities
// ---------------------------------------------------------------------------

/// Distinct values in order of first occurrence.
pub fn unique_values(values: &[DescriptorValue]) -> Vec<DescriptorValue> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| seen.insert(*v))
        .cloned()
        .collect()
}

/// Indices of entries matched by `selector`, in axis order.
pub fn membership_index(values: &[DescriptorValue], selector: &Selector) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| selector.matches(v))
        .map(|(i, _)| i)
        .collect()
}

/// One `name = [v0, v1, ...]` line per column.
pub fn format_descriptor(table: &DescriptorTable) -> String {
    table
        .iter()
        .map(|(name, values)| {
            let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
            format!("{name} = [{}]", joined.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact textual summary of a bin's members, e.g. `[0,1]` or `[0.25,0.50]`.
pub fn format_bin(values: &[DescriptorValue]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| match v {
            DescriptorValue::Float(x) => format!("{x:.2}"),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_compare_numerically() {
        assert_eq!(DescriptorValue::Integer(2), DescriptorValue::Float(2.0));
        assert!(DescriptorValue::Integer(1) < DescriptorValue::Float(1.5));
        assert!(DescriptorValue::Float(2.5) < DescriptorValue::Integer(3));
        assert!(DescriptorValue::Null < DescriptorValue::Bool(false));
    }

    #[test]
    fn signed_zeros_are_one_value() {
        let col = column([0.0, -0.0]);
        assert_eq!(col[0], col[1]);
        assert_eq!(unique_values(&col).len(), 1);
        assert_eq!(membership_index(&col, &Selector::from(0.0)), vec![0, 1]);
        assert_eq!(DescriptorValue::Integer(0), DescriptorValue::Float(-0.0));
    }

    #[test]
    fn large_integers_compare_exactly_with_floats() {
        let two_53 = 1_i64 << 53;
        let above = DescriptorValue::Integer(two_53 + 1);
        let float = DescriptorValue::Float(two_53 as f64);
        assert_ne!(above, float);
        assert!(above > float);
        assert_eq!(DescriptorValue::Integer(two_53), float);
        let col = vec![DescriptorValue::Integer(two_53), float, above];
        assert_eq!(unique_values(&col).len(), 2);
        assert!(DescriptorValue::Integer(i64::MAX) < DescriptorValue::Float(I64_BOUND));
        assert!(DescriptorValue::Integer(-3) < DescriptorValue::Float(-2.5));
        assert!(DescriptorValue::Integer(-2) > DescriptorValue::Float(-2.5));
    }

    #[test]
    fn unique_values_keep_first_occurrence_order() {
        let col = column(["b", "a", "b", "c", "a"]);
        assert_eq!(unique_values(&col), column(["b", "a", "c"]));
    }

    #[test]
    fn unique_values_merge_equal_numbers() {
        let col = vec![DescriptorValue::Integer(1), DescriptorValue::Float(1.0)];
        assert_eq!(unique_values(&col).len(), 1);
    }

    #[test]
    fn membership_index_supports_scalar_and_sequence() {
        let col = column([1, 2, 3, 2]);
        assert_eq!(membership_index(&col, &Selector::from(2)), vec![1, 3]);
        let any: Selector = column([1, 3]).into();
        assert_eq!(membership_index(&col, &any), vec![0, 2]);
    }

    #[test]
    fn check_length_reports_offending_column() {
        let table = DescriptorTable::new()
            .with_column("ok", column([1, 2]))
            .with_column("short", column([1]));
        match table.check_length("obs_descriptors", 2) {
            Err(DatasetError::DescriptorLength { name, found, .. }) => {
                assert_eq!(name, "short");
                assert_eq!(found, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn subset_applies_indices_to_every_column() {
        let table = DescriptorTable::new()
            .with_column("a", column([10, 20, 30]))
            .with_column("b", column(["x", "y", "z"]));
        let sub = table.subset(&[2, 0]);
        assert_eq!(sub.get("a").unwrap(), column([30, 10]).as_slice());
        assert_eq!(sub.get("b").unwrap(), column(["z", "x"]).as_slice());
    }

    #[test]
    fn require_names_the_table() {
        let err = DescriptorTable::new().require("time_descriptors", "time").unwrap_err();
        assert!(err.to_string().contains("time_descriptors"));
    }

    #[test]
    fn format_bin_matches_compact_array_layout() {
        assert_eq!(format_bin(&column([0, 1])), "[0,1]");
        assert_eq!(format_bin(&column([0.5, 1.25])), "[0.50,1.25]");
    }

    #[test]
    fn format_descriptor_lists_columns() {
        let table = DescriptorTable::new().with_column("cond", column(["a", "b"]));
        assert_eq!(format_descriptor(&table), "cond = [a, b]");
    }
}
