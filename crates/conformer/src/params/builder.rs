//! Lazy, two-axis parameter pipelines.
//!
//! A pipeline is a singly-linked chain of stages. Building one only allocates
//! nodes; no generator or predicate runs until the pipeline is iterated.
//!
//! ```text
//!   unit ── combine(a) ── expand(b) ── filter ──┐ begin_subcases() ── combine(c) ── unless
//!   └──────────────── case segment ────────────┘ └──────────── subcase segment ────────────┘
//! ```
//!
//! Case params are produced by folding the case segment over a single empty
//! object. For each case, the subcase segment is folded over a fresh empty
//! object at consumption time; its predicates and generators see the case
//! merged with the subcase-so-far, but the yielded subcase objects hold only
//! subcase keys.
//!
//! Key shadowing is detected lazily, when a merge finds the same key twice.
//! A builder that is never iterated never pays for that check.

use super::utils::merge_params;
use super::value::{ParamValue, Params};
use crate::result::{ConformError, ConformResult};
use std::borrow::Cow;
use std::fmt;
use std::iter;
use std::sync::Arc;

/// Lazy stream of params produced by one segment
pub(crate) type ParamsIter = Box<dyn Iterator<Item = ConformResult<Params>> + Send>;

type Predicate = Arc<dyn Fn(&Params) -> bool + Send + Sync>;
type ValueGenerator =
    Arc<dyn Fn(&Params) -> Box<dyn Iterator<Item = ParamValue> + Send> + Send + Sync>;
type ParamsGenerator =
    Arc<dyn Fn(&Params) -> Box<dyn Iterator<Item = Params> + Send> + Send + Sync>;

/// How one stage turns each accumulated object into zero or more partials
enum Expansion {
    CombineKey {
        key: String,
        values: Arc<[ParamValue]>,
    },
    CombineParams {
        partials: Arc<[Params]>,
    },
    ExpandKey {
        key: String,
        generate: ValueGenerator,
    },
    ExpandParams {
        generate: ParamsGenerator,
    },
}

impl Expansion {
    fn partials(&self, view: &Params) -> Box<dyn Iterator<Item = Params> + Send> {
        match self {
            Self::CombineKey { key, values } => {
                let key = key.clone();
                let values = Arc::clone(values);
                Box::new(
                    (0..values.len()).map(move |i| Params::new().with(key.clone(), values[i].clone())),
                )
            }
            Self::CombineParams { partials } => {
                let partials = Arc::clone(partials);
                Box::new((0..partials.len()).map(move |i| partials[i].clone()))
            }
            Self::ExpandKey { key, generate } => {
                let key = key.clone();
                Box::new(generate(view).map(move |v| Params::new().with(key.clone(), v)))
            }
            Self::ExpandParams { generate } => generate(view),
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::CombineKey { .. } => "combine",
            Self::CombineParams { .. } => "combine_with_params",
            Self::ExpandKey { .. } => "expand",
            Self::ExpandParams { .. } => "expand_with_params",
        }
    }
}

enum Stage {
    Expand(Expansion),
    Filter(Predicate),
    Unless(Predicate),
}

impl Stage {
    const fn name(&self) -> &'static str {
        match self {
            Self::Expand(e) => e.name(),
            Self::Filter(_) => "filter",
            Self::Unless(_) => "unless",
        }
    }
}

struct Node {
    stage: Stage,
    parent: Option<Arc<Node>>,
}

/// One axis of a pipeline: the tail of a node chain
#[derive(Clone, Default)]
struct Segment {
    tail: Option<Arc<Node>>,
    len: usize,
}

impl Segment {
    fn push(&self, stage: Stage) -> Self {
        Self {
            tail: Some(Arc::new(Node {
                stage,
                parent: self.tail.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Nodes root-first, collected without recursion
    fn nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes = Vec::with_capacity(self.len);
        let mut cursor = self.tail.clone();
        while let Some(node) = cursor {
            cursor = node.parent.clone();
            nodes.push(node);
        }
        nodes.reverse();
        nodes
    }

    fn stage_names(&self) -> Vec<&'static str> {
        self.nodes().iter().map(|n| n.stage.name()).collect()
    }

    /// Fold the segment over `seed`, with `base` merged into every stage's view
    fn evaluate(&self, base: Arc<Params>, seed: Params) -> ParamsIter {
        let mut stream: ParamsIter = Box::new(iter::once(Ok(seed)));
        for node in self.nodes() {
            stream = apply(node, stream, Arc::clone(&base));
        }
        stream
    }
}

/// What a stage's predicate or generator sees: the accumulator laid over base.
///
/// Shadowing between the two is reported by the final case/subcase merge, not here.
fn view<'a>(base: &Params, acc: &'a Params) -> Cow<'a, Params> {
    if base.is_empty() {
        return Cow::Borrowed(acc);
    }
    let mut overlay = base.clone();
    for (k, v) in acc.iter() {
        overlay.insert(k, v.clone());
    }
    Cow::Owned(overlay)
}

fn apply(node: Arc<Node>, input: ParamsIter, base: Arc<Params>) -> ParamsIter {
    match &node.stage {
        Stage::Filter(_) | Stage::Unless(_) => Box::new(input.filter_map(move |item| {
            let acc = match item {
                Ok(acc) => acc,
                Err(e) => return Some(Err(e)),
            };
            let v = view(&base, &acc);
            let matched = match &node.stage {
                Stage::Filter(pred) => pred(&v),
                Stage::Unless(pred) => !pred(&v),
                Stage::Expand(_) => true,
            };
            matched.then_some(Ok(acc))
        })),
        Stage::Expand(_) => Box::new(input.flat_map(move |item| -> ParamsIter {
            let acc = match item {
                Ok(acc) => acc,
                Err(e) => return Box::new(iter::once(Err(e))),
            };
            let partials = match &node.stage {
                Stage::Expand(expansion) => expansion.partials(&view(&base, &acc)),
                _ => Box::new(iter::empty()),
            };
            Box::new(partials.map(move |partial| merge_params(&acc, &partial)))
        })),
    }
}

fn find_duplicate<T: PartialEq>(items: &[T]) -> Option<&T> {
    items
        .iter()
        .enumerate()
        .find(|(i, item)| items[..*i].contains(item))
        .map(|(_, item)| item)
}

/// A finished parameterization: the case axis plus an optional subcase axis.
///
/// Both builder types convert into this; test registration stores it unevaluated.
#[derive(Clone, Default)]
pub struct ParamsPipeline {
    cases: Segment,
    subcases: Option<Segment>,
    defect: Option<String>,
}

impl ParamsPipeline {
    fn with_stage(mut self, stage: Stage) -> Self {
        match &mut self.subcases {
            Some(segment) => *segment = segment.push(stage),
            None => self.cases = self.cases.push(stage),
        }
        self
    }

    fn with_defect(mut self, defect: String) -> Self {
        self.defect.get_or_insert(defect);
        self
    }

    /// Whether `begin_subcases()` was called
    #[must_use]
    pub fn has_subcases(&self) -> bool {
        self.subcases.is_some()
    }

    /// Report structural defects found while building (e.g. duplicate combine values)
    pub fn check(&self) -> ConformResult<()> {
        match &self.defect {
            Some(message) => Err(ConformError::InvalidParams {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Lazily yield `(case params, subcases)` pairs in pipeline order.
    ///
    /// `subcases` is `None` when the pipeline never called `begin_subcases()`.
    /// Errors (structural defects, key shadowing) surface as `Err` items.
    #[must_use]
    pub fn iterate_cases_with_subcases(&self) -> CaseIter {
        let cases = match self.check() {
            Ok(()) => self.cases.evaluate(Arc::new(Params::new()), Params::new()),
            Err(e) => Box::new(iter::once(Err(e))),
        };
        CaseIter {
            cases,
            subcases: self.subcases.clone(),
        }
    }
}

impl fmt::Debug for ParamsPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamsPipeline")
            .field("cases", &self.cases.stage_names())
            .field("subcases", &self.subcases.as_ref().map(Segment::stage_names))
            .field("defect", &self.defect)
            .finish()
    }
}

/// Iterator over `(case params, subcases)` pairs
pub struct CaseIter {
    cases: ParamsIter,
    subcases: Option<Segment>,
}

impl Iterator for CaseIter {
    type Item = ConformResult<(Params, Option<Subcases>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let case = match self.cases.next()? {
            Ok(case) => case,
            Err(e) => return Some(Err(e)),
        };
        let subcases = self.subcases.as_ref().map(|segment| Subcases {
            case: Arc::new(case.clone()),
            segment: segment.clone(),
        });
        Some(Ok((case, subcases)))
    }
}

impl fmt::Debug for CaseIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseIter")
            .field("has_subcases", &self.subcases.is_some())
            .finish_non_exhaustive()
    }
}

/// The subcase axis bound to one case. Restartable: each `iter()` re-evaluates.
#[derive(Clone)]
pub struct Subcases {
    case: Arc<Params>,
    segment: Segment,
}

impl Subcases {
    /// Lazily evaluate the subcase segment for this case
    #[must_use]
    pub fn iter(&self) -> SubcaseIter {
        SubcaseIter(self.segment.evaluate(Arc::clone(&self.case), Params::new()))
    }

    /// The case these subcases belong to
    #[must_use]
    pub fn case_params(&self) -> &Params {
        &self.case
    }
}

impl fmt::Debug for Subcases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subcases")
            .field("case", &self.case)
            .field("stages", &self.segment.stage_names())
            .finish()
    }
}

impl IntoIterator for &Subcases {
    type Item = ConformResult<Params>;
    type IntoIter = SubcaseIter;

    fn into_iter(self) -> SubcaseIter {
        self.iter()
    }
}

/// Iterator over one case's subcase params
pub struct SubcaseIter(ParamsIter);

impl Iterator for SubcaseIter {
    type Item = ConformResult<Params>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl fmt::Debug for SubcaseIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubcaseIter").finish_non_exhaustive()
    }
}

/// Builder for the case axis. Start from [`unit_params`].
#[derive(Clone, Default)]
pub struct CaseParamsBuilder(ParamsPipeline);

/// Builder for the subcase axis, produced by [`CaseParamsBuilder::begin_subcases`]
#[derive(Clone)]
pub struct SubcaseParamsBuilder(ParamsPipeline);

/// The unit builder: exactly one case, `{}`, and no subcases
#[must_use]
pub fn unit_params() -> CaseParamsBuilder {
    CaseParamsBuilder::default()
}

impl CaseParamsBuilder {
    /// Switch to the subcase axis; every later stage applies per case
    #[must_use]
    pub fn begin_subcases(self) -> SubcaseParamsBuilder {
        let mut pipeline = self.0;
        pipeline.subcases = Some(Segment::default());
        SubcaseParamsBuilder(pipeline)
    }
}

macro_rules! impl_combinators {
    ($builder:ident) => {
        impl $builder {
            /// Cross-product with each of `values` under `key`.
            ///
            /// Values must be distinct; duplicates mark the builder defective.
            #[must_use]
            pub fn combine<K, I, V>(self, key: K, values: I) -> Self
            where
                K: Into<String>,
                I: IntoIterator<Item = V>,
                V: Into<ParamValue>,
            {
                let key = key.into();
                let values: Arc<[ParamValue]> = values.into_iter().map(Into::into).collect();
                let defect = find_duplicate(&values)
                    .map(|dup| format!("duplicate value {dup} in combine('{key}', ...)"));
                let pipeline = self.0.with_stage(Stage::Expand(Expansion::CombineKey { key, values }));
                Self(match defect {
                    Some(d) => pipeline.with_defect(d),
                    None => pipeline,
                })
            }

            /// Cross-product with each of `partials`, merged in wholesale
            #[must_use]
            pub fn combine_with_params<I>(self, partials: I) -> Self
            where
                I: IntoIterator<Item = Params>,
            {
                let partials: Arc<[Params]> = partials.into_iter().collect();
                let defect = find_duplicate(&partials)
                    .map(|dup| format!("duplicate params {dup} in combine_with_params(...)"));
                let pipeline =
                    self.0.with_stage(Stage::Expand(Expansion::CombineParams { partials }));
                Self(match defect {
                    Some(d) => pipeline.with_defect(d),
                    None => pipeline,
                })
            }

            /// Alias of [`Self::combine_with_params`]
            #[must_use]
            pub fn combine_p<I>(self, partials: I) -> Self
            where
                I: IntoIterator<Item = Params>,
            {
                self.combine_with_params(partials)
            }

            /// Keep only params satisfying `pred`
            #[must_use]
            pub fn filter<F>(self, pred: F) -> Self
            where
                F: Fn(&Params) -> bool + Send + Sync + 'static,
            {
                Self(self.0.with_stage(Stage::Filter(Arc::new(pred))))
            }

            /// Drop params satisfying `pred`; exactly `filter(|p| !pred(p))`
            #[must_use]
            pub fn unless<F>(self, pred: F) -> Self
            where
                F: Fn(&Params) -> bool + Send + Sync + 'static,
            {
                Self(self.0.with_stage(Stage::Unless(Arc::new(pred))))
            }

            /// For each params, cross-product with the values `generate` yields under `key`
            #[must_use]
            pub fn expand<K, G, I>(self, key: K, generate: G) -> Self
            where
                K: Into<String>,
                G: Fn(&Params) -> I + Send + Sync + 'static,
                I: IntoIterator,
                I::Item: Into<ParamValue> + 'static,
                I::IntoIter: Send + 'static,
            {
                let generate: ValueGenerator = Arc::new(move |p: &Params| {
                    Box::new(generate(p).into_iter().map(Into::into))
                        as Box<dyn Iterator<Item = ParamValue> + Send>
                });
                Self(self.0.with_stage(Stage::Expand(Expansion::ExpandKey {
                    key: key.into(),
                    generate,
                })))
            }

            /// For each params, cross-product with the partials `generate` yields
            #[must_use]
            pub fn expand_with_params<G, I>(self, generate: G) -> Self
            where
                G: Fn(&Params) -> I + Send + Sync + 'static,
                I: IntoIterator<Item = Params>,
                I::IntoIter: Send + 'static,
            {
                let generate: ParamsGenerator = Arc::new(move |p: &Params| {
                    Box::new(generate(p).into_iter()) as Box<dyn Iterator<Item = Params> + Send>
                });
                Self(self.0.with_stage(Stage::Expand(Expansion::ExpandParams { generate })))
            }

            /// Alias of [`Self::expand_with_params`]
            #[must_use]
            pub fn expand_p<G, I>(self, generate: G) -> Self
            where
                G: Fn(&Params) -> I + Send + Sync + 'static,
                I: IntoIterator<Item = Params>,
                I::IntoIter: Send + 'static,
            {
                self.expand_with_params(generate)
            }

            /// Lazily yield `(case params, subcases)` pairs
            #[must_use]
            pub fn iterate_cases_with_subcases(&self) -> CaseIter {
                self.0.iterate_cases_with_subcases()
            }

            /// Report structural defects found while building
            pub fn check(&self) -> ConformResult<()> {
                self.0.check()
            }
        }

        impl From<$builder> for ParamsPipeline {
            fn from(builder: $builder) -> Self {
                builder.0
            }
        }

        impl fmt::Debug for $builder {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($builder)).field(&self.0).finish()
            }
        }
    };
}

impl_combinators!(CaseParamsBuilder);
impl_combinators!(SubcaseParamsBuilder);
