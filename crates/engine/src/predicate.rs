//! Predicates
//!
//! A predicate is a named boolean gate evaluated against the Value Store
//! before a Function or Action fires. It declares the names it reads; those
//! reads are dependency edges for ordering but never change triggers.
//!
//! Besides [`Predicate::new`] for arbitrary checks, this module carries a
//! small library:
//!
//! - literal comparisons: [`Predicate::equals`], [`Predicate::compare`]
//! - presence: [`Predicate::truthy`], [`Predicate::exists`]
//! - ordered scales of strings such as release names: [`Scale`]
//! - combinators: [`Predicate::any`], [`Predicate::all`],
//!   [`Predicate::none`], [`Predicate::not`]
//!
//! A missing value makes comparison predicates false rather than failing.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use reflow_core::{normalize_name, Address, ResolveError, ResolveResult, Value};

use crate::context::ContextView;

/// Predicate check
pub type Check = Arc<dyn Fn(&ContextView<'_>) -> ResolveResult<bool> + Send + Sync>;

/// Comparison operator for literal predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Apply to an ordering
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    /// Operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Named ordering over strings, e.g. `["precise", "trusty", "xenial"]`
///
/// Strings compare by their position in the scale, not lexically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scale {
    steps: Vec<String>,
}

impl Scale {
    /// Build a scale from lowest to highest
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scale {
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Position of `step`, `None` if it is not on the scale
    pub fn position(&self, step: &str) -> Option<usize> {
        self.steps.iter().position(|s| s == step)
    }

    /// Compare two steps; fails if either is not on the scale
    pub fn compare(&self, a: &str, b: &str) -> ResolveResult<Ordering> {
        let pa = self
            .position(a)
            .ok_or_else(|| ResolveError::failed(format!("'{}' is not on the scale", a)))?;
        let pb = self
            .position(b)
            .ok_or_else(|| ResolveError::failed(format!("'{}' is not on the scale", b)))?;
        Ok(pa.cmp(&pb))
    }

    /// Steps from lowest to highest
    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

/// A named boolean gate over the Value Store
#[derive(Clone)]
pub struct Predicate {
    name: String,
    reads: Vec<String>,
    check: Check,
}

impl Predicate {
    /// Predicate with an arbitrary check over `reads`
    pub fn new<I, S, F>(name: &str, reads: I, check: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&ContextView<'_>) -> ResolveResult<bool> + Send + Sync + 'static,
    {
        let mut tops = Vec::new();
        for read in reads {
            let top = Address::parse(read.as_ref()).top().to_string();
            if !tops.contains(&top) {
                tops.push(top);
            }
        }
        Predicate {
            name: normalize_name(name),
            reads: tops,
            check: Arc::new(check),
        }
    }

    /// Value at `address` equals `literal`
    pub fn equals(name: &str, address: &str, literal: impl Into<Value>) -> Self {
        let literal = literal.into();
        let target = address.to_string();
        Predicate::new(name, [address], move |view| {
            Ok(view.try_lookup(&target)?.map_or(false, |v| *v == literal))
        })
    }

    /// `value(address) <op> literal` over same-typed scalars
    ///
    /// Comparing values of different types is a predicate failure.
    pub fn compare(name: &str, address: &str, op: CompareOp, literal: impl Into<Value>) -> Self {
        let literal = literal.into();
        let target = address.to_string();
        Predicate::new(name, [address], move |view| {
            let Some(value) = view.try_lookup(&target)? else {
                return Ok(false);
            };
            let ordering = value.compare(&literal).ok_or_else(|| {
                ResolveError::failed(format!(
                    "cannot compare {} at '{}' with {}",
                    value.type_name(),
                    target,
                    literal.type_name()
                ))
            })?;
            Ok(op.holds(ordering))
        })
    }

    /// Value at `address` is truthy (missing counts as false)
    pub fn truthy(name: &str, address: &str) -> Self {
        let target = address.to_string();
        Predicate::new(name, [address], move |view| {
            Ok(view.try_lookup(&target)?.map_or(false, Value::is_truthy))
        })
    }

    /// A value exists at `address` (null counts as absent)
    pub fn exists(name: &str, address: &str) -> Self {
        let target = address.to_string();
        Predicate::new(name, [address], move |view| {
            Ok(view.try_lookup(&target)?.map_or(false, |v| !v.is_null()))
        })
    }

    /// `value(address) <op> literal` by position on `scale`
    pub fn on_scale(name: &str, address: &str, scale: Scale, op: CompareOp, literal: &str) -> Self {
        let literal = literal.to_string();
        let target = address.to_string();
        Predicate::new(name, [address], move |view| {
            let Some(value) = view.try_lookup(&target)? else {
                return Ok(false);
            };
            let step = value.as_str().ok_or_else(|| {
                ResolveError::failed(format!(
                    "'{}' is {}, expected string",
                    target,
                    value.type_name()
                ))
            })?;
            Ok(op.holds(scale.compare(step, &literal)?))
        })
    }

    /// True if any operand is true
    pub fn any(name: &str, operands: Vec<Predicate>) -> Self {
        Predicate::combine(name, operands, |results| {
            for result in results {
                if result? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    /// True if every operand is true
    pub fn all(name: &str, operands: Vec<Predicate>) -> Self {
        Predicate::combine(name, operands, |results| {
            for result in results {
                if !result? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// True if no operand is true
    pub fn none(name: &str, operands: Vec<Predicate>) -> Self {
        let inner = Predicate::any(name, operands);
        Predicate::not(name, inner)
    }

    /// Negation
    pub fn not(name: &str, operand: Predicate) -> Self {
        let reads = operand.reads.clone();
        Predicate::new(name, reads, move |view| Ok(!operand.evaluate(view)?))
    }

    // Operands short-circuit in declaration order.
    fn combine<F>(name: &str, operands: Vec<Predicate>, fold: F) -> Self
    where
        F: Fn(&mut dyn Iterator<Item = ResolveResult<bool>>) -> ResolveResult<bool>
            + Send
            + Sync
            + 'static,
    {
        let reads: Vec<String> = operands.iter().flat_map(|p| p.reads.clone()).collect();
        Predicate::new(name, reads, move |view| {
            let mut results = operands.iter().map(|p| p.evaluate(view));
            fold(&mut results)
        })
    }

    /// Normalized name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level names this predicate reads
    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    /// Run the check
    ///
    /// The view must allow at least this predicate's reads.
    pub fn evaluate(&self, view: &ContextView<'_>) -> ResolveResult<bool> {
        (self.check)(view)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("name", &self.name)
            .field("reads", &self.reads)
            .finish()
    }
}
