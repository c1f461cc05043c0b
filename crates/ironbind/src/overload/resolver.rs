//! Overload selection for managed method groups.
//!
//! Each candidate maps the call's arguments onto its parameters, classifies every
//! argument's conversion and gets a score vector of conversion ranks in argument
//! order. The lowest vector wins; ties go to the candidate with more derived
//! parameters, then to non-generic and non-variadic candidates.
//!
//! Conversions that can fail for particular values are applied while scoring, so a
//! candidate whose narrowing overflows drops out. Conversions that run user code
//! (hooks, implicit operators) run only for the winner, left to right.

use std::rc::Rc;

use ahash::AHashMap;

use super::{
    Candidate, OverloadSet, ParamType,
    conversion::{ConversionContext, ConversionKind, ConvertFailure},
};
use crate::{
    args::ArgValues,
    coerce::widening_chain,
    exception::{ArityBound, ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    runtime::Runtime,
    types::{ManagedArray, Type},
    value::Value,
};

/// Call-site cache: group plus argument-type vector to the index of the winner.
pub(crate) type CallSiteCache = AHashMap<CallSiteKey, usize>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CallSiteKey {
    group: HeapId,
    types: Vec<Type>,
    keywords: Vec<String>,
}

/// Why one candidate does not apply.
#[derive(Debug)]
enum Failure {
    Arity,
    UnexpectedKeyword(String),
    NameAndPosition { param: String, position: usize },
    Mismatch { expected: String, got: String },
    Range(RunError),
}

/// One actual argument routed to a candidate's parameter.
#[derive(Debug)]
struct Routed {
    value: Value,
    target: ParamType,
    kind: ConversionKind,
    /// The converted value, when the conversion was applied during scoring.
    converted: Option<Value>,
}

/// Arguments mapped onto a candidate before conversion.
struct Mapping {
    /// Parameter slot of each actual argument (`None` for the variadic tail), in
    /// argument order.
    slots: Vec<Option<usize>>,
    values: Vec<Value>,
}

/// A candidate that accepts the call.
#[derive(Debug)]
struct Applicable {
    index: usize,
    score: Vec<(u8, u32)>,
    routed: Vec<Routed>,
    slots: Vec<Option<usize>>,
}

enum Selection {
    Chosen(Applicable),
    NoMatch(Vec<Failure>),
}

impl Runtime {
    /// Selects and invokes the best overload of the group at `group_id`.
    pub(crate) fn resolve_and_invoke(
        &mut self,
        group_id: HeapId,
        receiver: Option<Value>,
        args: ArgValues,
    ) -> RunResult<Value> {
        let set = self.overload_set(group_id)?;
        let (positional, kwargs) = args.into_parts();
        let positional: Vec<Value> = positional.collect();
        let keywords: Vec<(String, Value)> = kwargs.into_iter().collect();
        match self.select(group_id, &set, &positional, &keywords)? {
            Selection::Chosen(chosen) => self.invoke_chosen(&set, chosen, receiver),
            Selection::NoMatch(failures) => Err(self.no_match_error(&set, failures, positional.len() + keywords.len())),
        }
    }

    /// Like [`Runtime::resolve_and_invoke`] for positional arguments, but returns
    /// `Ok(None)` when no candidate accepts them. Operator dispatch uses this to
    /// fall through to the reflected operand.
    pub(crate) fn select_overload(&mut self, group_id: HeapId, args: &[Value]) -> RunResult<Option<Value>> {
        let set = self.overload_set(group_id)?;
        match self.select(group_id, &set, args, &[])? {
            Selection::Chosen(chosen) => self.invoke_chosen(&set, chosen, None).map(Some),
            Selection::NoMatch(_) => Ok(None),
        }
    }

    fn overload_set(&self, group_id: HeapId) -> RunResult<OverloadSet> {
        match self.heap.get(group_id) {
            HeapData::MethodGroup(set) => Ok(set.clone()),
            _ => Err(RunError::internal("overload resolution on a non-group")),
        }
    }

    fn select(
        &mut self,
        group_id: HeapId,
        set: &OverloadSet,
        positional: &[Value],
        keywords: &[(String, Value)],
    ) -> RunResult<Selection> {
        let key = CallSiteKey {
            group: group_id,
            types: positional.iter().chain(keywords.iter().map(|(_, v)| v)).map(|v| self.type_of(*v)).collect(),
            keywords: keywords.iter().map(|(k, _)| k.clone()).collect(),
        };
        if let Some(&index) = self.call_sites.get(&key)
            && let Some(candidate) = set.candidates.get(index)
            && let Ok(Some(chosen)) = self.try_candidate(index, candidate, positional, keywords).map(Result::ok)
        {
            let signature = self.signature_of(candidate);
            self.tracer.on_overload_selected(&set.name, &signature, true);
            return Ok(Selection::Chosen(chosen));
        }

        let mut applicable = Vec::new();
        let mut failures = Vec::new();
        let mut value_dependent = false;
        for (index, candidate) in set.candidates.iter().enumerate() {
            match self.try_candidate(index, candidate, positional, keywords)? {
                Ok(found) => {
                    value_dependent |= found.routed.iter().any(|r| r.kind.is_value_dependent());
                    applicable.push(found);
                }
                Err(failure) => {
                    value_dependent |= matches!(failure, Failure::Range(_));
                    failures.push(failure);
                }
            }
        }
        if applicable.is_empty() {
            return Ok(Selection::NoMatch(failures));
        }
        let chosen = self.pick_best(set, applicable)?;
        if !value_dependent {
            if self.call_sites.len() >= self.config.call_site_cache_capacity {
                self.call_sites.clear();
            }
            self.call_sites.insert(key, chosen.index);
        }
        let signature = self.signature_of(&set.candidates[chosen.index]);
        self.tracer.on_overload_selected(&set.name, &signature, false);
        Ok(Selection::Chosen(chosen))
    }

    /// Maps and scores one candidate. The outer error is user code raising during a
    /// value-dependent conversion; the inner one says why the candidate does not apply.
    fn try_candidate(
        &mut self,
        index: usize,
        candidate: &Candidate,
        positional: &[Value],
        keywords: &[(String, Value)],
    ) -> RunResult<Result<Applicable, Failure>> {
        let mapping = match map_arguments(candidate, positional, keywords) {
            Ok(mapping) => mapping,
            Err(failure) => return Ok(Err(failure)),
        };
        let mut generics: Vec<(u8, Type)> = Vec::new();
        let mut routed = Vec::with_capacity(mapping.values.len());
        let mut score = Vec::with_capacity(mapping.values.len());
        for (slot, value) in mapping.slots.iter().zip(&mapping.values) {
            let declared = match slot {
                Some(i) => &candidate.params[*i].ty,
                None => candidate.variadic.as_ref().unwrap_or(&ParamType::Object),
            };
            let from = self.type_of(*value);
            if let ParamType::Generic(n) = declared {
                match generics.iter().find(|(g, _)| g == n) {
                    Some((_, bound)) if *bound != from => {
                        return Ok(Err(Failure::Mismatch {
                            expected: self.name_of_type(*bound),
                            got: self.name_of_type(from),
                        }));
                    }
                    Some(_) => {}
                    None => generics.push((*n, from)),
                }
            }
            let kind = self.conversion_kind(from, declared, ConversionContext::Implicit);
            if !kind.is_compatible() {
                return Ok(Err(Failure::Mismatch {
                    expected: self.param_type_name(declared),
                    got: self.name_of_type(from),
                }));
            }
            let mut converted = None;
            if kind.is_value_dependent() && !kind.is_deferred() {
                match self.apply_conversion(*value, &kind, declared, ConversionContext::Implicit) {
                    Ok(v) => converted = Some(v),
                    Err(ConvertFailure::Mismatch) => {
                        return Ok(Err(Failure::Mismatch {
                            expected: self.param_type_name(declared),
                            got: self.name_of_type(from),
                        }));
                    }
                    Err(ConvertFailure::Range(err)) => return Ok(Err(Failure::Range(err))),
                    Err(ConvertFailure::Raised(err)) => return Err(err),
                }
            }
            score.push(kind.rank());
            routed.push(Routed {
                value: *value,
                target: declared.clone(),
                kind,
                converted,
            });
        }
        Ok(Ok(Applicable {
            index,
            score,
            routed,
            slots: mapping.slots,
        }))
    }

    fn pick_best(&self, set: &OverloadSet, applicable: Vec<Applicable>) -> RunResult<Applicable> {
        let Some(best) = applicable.iter().map(|a| a.score.clone()).min() else {
            return Err(RunError::internal("no applicable candidate to pick"));
        };
        let mut tied: Vec<Applicable> = applicable.into_iter().filter(|a| a.score == best).collect();
        if tied.len() > 1 {
            let undominated: Vec<bool> = tied
                .iter()
                .map(|a| !tied.iter().any(|b| self.dominates(b, a)))
                .collect();
            let mut flags = undominated.into_iter();
            tied.retain(|_| flags.next().unwrap_or(true));
        }
        let candidates = &set.candidates;
        if tied.len() > 1 && tied.iter().any(|a| !candidates[a.index].is_generic()) {
            tied.retain(|a| !candidates[a.index].is_generic());
        }
        if tied.len() > 1 && tied.iter().any(|a| candidates[a.index].variadic.is_none()) {
            tied.retain(|a| candidates[a.index].variadic.is_none());
        }
        if tied.len() > 1 {
            let signatures: Vec<String> = tied.iter().map(|a| self.signature_of(&candidates[a.index])).collect();
            return Err(ExcType::ambiguous_match(&signatures));
        }
        tied.pop().ok_or_else(|| RunError::internal("tie-break removed every candidate"))
    }

    /// `a` dominates `b` when each of its parameter types is at least as derived and
    /// one is strictly more derived.
    fn dominates(&self, a: &Applicable, b: &Applicable) -> bool {
        let mut strictly = false;
        for (x, y) in a.routed.iter().zip(&b.routed) {
            if x.target == y.target {
                continue;
            }
            if self.more_derived(&x.target, &y.target) {
                strictly = true;
            } else {
                return false;
            }
        }
        strictly
    }

    fn more_derived(&self, a: &ParamType, b: &ParamType) -> bool {
        match (a, b) {
            (_, ParamType::Object) => true,
            (_, ParamType::Generic(_)) => !matches!(a, ParamType::Generic(_)),
            (ParamType::Class(x), ParamType::Class(y)) => self.types.class_distance(*x, *y).is_some(),
            (ParamType::Builtin(x), ParamType::Builtin(y)) => self.types.type_distance(*x, *y).is_some(),
            (ParamType::Primitive(x), ParamType::Primitive(y)) => {
                x.is_integer() && y.is_integer() && widening_chain(*x, *y).is_some()
            }
            (ParamType::Nullable(x), ParamType::Nullable(y)) | (ParamType::Array(x), ParamType::Array(y)) => {
                self.more_derived(x, y)
            }
            _ => false,
        }
    }

    fn invoke_chosen(&mut self, set: &OverloadSet, chosen: Applicable, receiver: Option<Value>) -> RunResult<Value> {
        let candidate = Rc::clone(&set.candidates[chosen.index]);
        let mut params: Vec<Option<Value>> = vec![None; candidate.params.len()];
        let mut tail = Vec::new();
        for (routed, slot) in chosen.routed.into_iter().zip(chosen.slots) {
            let value = match routed.converted {
                Some(v) => v,
                None => match self.apply_conversion(routed.value, &routed.kind, &routed.target, ConversionContext::Implicit) {
                    Ok(v) => v,
                    Err(ConvertFailure::Mismatch) => {
                        return Err(ExcType::type_error_expected_got(
                            &self.param_type_name(&routed.target),
                            &self.type_name(routed.value),
                        ));
                    }
                    Err(ConvertFailure::Range(err) | ConvertFailure::Raised(err)) => return Err(err),
                },
            };
            match slot {
                Some(i) => params[i] = Some(value),
                None => tail.push(value),
            }
        }
        let mut body_args = Vec::with_capacity(params.len() + 2);
        body_args.extend(receiver);
        for (value, param) in params.into_iter().zip(&candidate.params) {
            match value.or(param.default) {
                Some(v) => body_args.push(v),
                None => return Err(RunError::internal("unfilled parameter after selection")),
            }
        }
        if let Some(elem) = &candidate.variadic {
            let array = ManagedArray::new(elem.clone(), tail);
            body_args.push(self.alloc(HeapData::ManagedArray(array)));
        }
        (candidate.body)(self, body_args)
    }

    /// Display form of a candidate, e.g. `M(Int32, Array[Byte])`.
    fn signature_of(&self, candidate: &Candidate) -> String {
        let mut parts: Vec<String> = candidate.params.iter().map(|p| self.managed_type_name(&p.ty)).collect();
        if let Some(elem) = &candidate.variadic {
            parts.push(format!("params Array[{}]", self.managed_type_name(elem)));
        }
        format!("{}({})", candidate.name, parts.join(", "))
    }

    fn managed_type_name(&self, ty: &ParamType) -> String {
        match ty {
            ParamType::Primitive(p) => p.managed_name().to_owned(),
            other => self.param_type_name(other),
        }
    }

    /// Picks the error for a call no candidate accepts.
    fn no_match_error(&self, set: &OverloadSet, failures: Vec<Failure>, given: usize) -> RunError {
        if let Some(Failure::NameAndPosition { param, position }) =
            failures.iter().find(|f| matches!(f, Failure::NameAndPosition { .. }))
        {
            return ExcType::type_error_managed_name_and_position(&set.name, param, *position);
        }
        if !failures.is_empty() && failures.iter().all(|f| matches!(f, Failure::UnexpectedKeyword(_))) {
            if let Some(Failure::UnexpectedKeyword(key)) = failures.first() {
                return ExcType::type_error_unexpected_keyword(&set.name, key);
            }
        }
        if failures.iter().all(|f| matches!(f, Failure::Arity | Failure::UnexpectedKeyword(_))) {
            return self.arity_error(set, given);
        }
        let mut first_mismatch = None;
        for failure in failures {
            match failure {
                Failure::Range(err) => return err,
                Failure::Mismatch { expected, got } if first_mismatch.is_none() => {
                    first_mismatch = Some(ExcType::type_error_expected_got(&expected, &got));
                }
                _ => {}
            }
        }
        first_mismatch.unwrap_or_else(|| self.arity_error(set, given))
    }

    fn arity_error(&self, set: &OverloadSet, given: usize) -> RunError {
        let min = set.candidates.iter().map(|c| c.required_count()).min().unwrap_or(0);
        let max = set.candidates.iter().map(|c| c.params.len()).max().unwrap_or(0);
        let variadic = set.candidates.iter().any(|c| c.variadic.is_some());
        let (bound, expected) = if given < min {
            if min == max && !variadic {
                (ArityBound::Exactly, min)
            } else {
                (ArityBound::AtLeast, min)
            }
        } else if min == max {
            (ArityBound::Exactly, max)
        } else {
            (ArityBound::AtMost, max)
        };
        ExcType::type_error_managed_arity(&set.name, bound, expected, given)
    }
}

/// Routes positionals in order, extras to the variadic tail and keywords by
/// parameter name; parameters left over must have defaults.
fn map_arguments(candidate: &Candidate, positional: &[Value], keywords: &[(String, Value)]) -> Result<Mapping, Failure> {
    let count = candidate.params.len();
    let mut filled = vec![false; count];
    let mut slots = Vec::with_capacity(positional.len() + keywords.len());
    let mut values = Vec::with_capacity(positional.len() + keywords.len());
    for (i, value) in positional.iter().enumerate() {
        if i < count {
            filled[i] = true;
            slots.push(Some(i));
        } else if candidate.variadic.is_some() {
            slots.push(None);
        } else {
            return Err(Failure::Arity);
        }
        values.push(*value);
    }
    for (name, value) in keywords {
        let Some(i) = candidate.params.iter().position(|p| p.name == *name) else {
            return Err(Failure::UnexpectedKeyword(name.clone()));
        };
        if filled[i] {
            return Err(Failure::NameAndPosition {
                param: name.clone(),
                position: i + 1,
            });
        }
        filled[i] = true;
        slots.push(Some(i));
        values.push(*value);
    }
    let missing = filled
        .iter()
        .zip(&candidate.params)
        .any(|(filled, param)| !filled && param.default.is_none());
    if missing {
        return Err(Failure::Arity);
    }
    Ok(Mapping { slots, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        EngineConfig,
        overload::Param,
        types::{ClassBuilder, Primitive},
    };

    fn tag(label: &'static str) -> impl Fn(&mut Runtime, Vec<Value>) -> RunResult<Value> {
        move |rt, _| Ok(rt.new_str(label))
    }

    fn call_str(rt: &mut Runtime, group: Value, args: Vec<Value>) -> String {
        let result = rt.call(group, args).unwrap();
        rt.as_str(result).unwrap().to_owned()
    }

    #[test]
    fn narrowest_integer_wins() {
        let mut rt = Runtime::new(EngineConfig::default());
        let group = rt.define_overloads(
            OverloadSet::new("M")
                .with(Candidate::new(vec![Param::new("x", ParamType::Primitive(Primitive::Int64))], tag("Int64")))
                .with(Candidate::new(vec![Param::new("x", ParamType::Primitive(Primitive::Int32))], tag("Int32")))
                .with(Candidate::new(vec![Param::new("x", ParamType::Object)], tag("object"))),
        );
        assert_eq!(call_str(&mut rt, group, vec![Value::Int(5)]), "Int32");
        assert_eq!(call_str(&mut rt, group, vec![Value::Int(1 << 40)]), "Int64");
        let s = rt.new_str("s");
        assert_eq!(call_str(&mut rt, group, vec![s]), "object");
    }

    #[test]
    fn derived_parameter_breaks_ties() {
        let mut rt = Runtime::new(EngineConfig::default());
        let base = rt.define_class(ClassBuilder::managed("Base"));
        let derived = rt.define_class(ClassBuilder::managed("Derived").base(base));
        let group = rt.define_overloads(
            OverloadSet::new("M")
                .with(Candidate::new(vec![Param::new("x", ParamType::Class(base))], tag("base")))
                .with(Candidate::new(vec![Param::new("x", ParamType::Class(derived))], tag("derived"))),
        );
        let d = rt.new_instance(derived);
        let b = rt.new_instance(base);
        assert_eq!(call_str(&mut rt, group, vec![d]), "derived");
        assert_eq!(call_str(&mut rt, group, vec![b]), "base");
    }

    #[test]
    fn keyword_given_twice_is_reported() {
        let mut rt = Runtime::new(EngineConfig::default());
        let group = rt.define_overloads(OverloadSet::new("M").with(Candidate::new(
            vec![Param::new("x", ParamType::Object), Param::new("y", ParamType::Object)],
            tag("ok"),
        )));
        let err = rt
            .call(group, ArgValues::new(vec![Value::Int(1)], vec![("x".to_owned(), Value::Int(2))]))
            .unwrap_err();
        assert_eq!(err.message(), Some("Argument for M() given by name ('x') and position (1)"));
        let err = rt.call(group, vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.message(), Some("M() takes exactly 2 arguments (1 given)"));
    }

    #[test]
    fn range_failure_surfaces_overflow() {
        let mut rt = Runtime::new(EngineConfig::default());
        let group = rt.define_overloads(
            OverloadSet::new("M")
                .with(Candidate::new(vec![Param::new("x", ParamType::Primitive(Primitive::Byte))], tag("byte"))),
        );
        let err = rt.call(group, vec![Value::Int(300)]).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
        let s = rt.new_str("s");
        let err = rt.call(group, vec![s]).unwrap_err();
        assert_eq!(err.message(), Some("expected Byte, got str"));
    }
}
