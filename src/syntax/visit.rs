//! Generic traversal over expression trees
//!
//! Every traversal is an exhaustive `match` over [`ExprKind`], so adding a
//! node form is a compile error here until each walk handles it.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::*;

impl<P: Phase> Expr<P> {
    /// Short name of the node form, used in messages
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Literal(_) => "literal",
            ExprKind::Undefined => "undefined",
            ExprKind::Variable { .. } => "variable",
            ExprKind::SelfRef => "self",
            ExprKind::ThreadId => "threadid",
            ExprKind::Time => "time",
            ExprKind::NotYetSpecified => "is not yet specified",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::If { .. } => "if expression",
            ExprKind::Cases { .. } => "cases expression",
            ExprKind::Let { .. } => "let expression",
            ExprKind::Def { .. } => "def expression",
            ExprKind::LetBeSt { .. } => "let be st expression",
            ExprKind::Forall { .. } => "forall expression",
            ExprKind::Exists { .. } => "exists expression",
            ExprKind::Exists1 { .. } => "exists1 expression",
            ExprKind::Iota { .. } => "iota expression",
            ExprKind::Lambda { .. } => "lambda expression",
            ExprKind::SetEnum(_) => "set enumeration",
            ExprKind::SetRange { .. } => "set range",
            ExprKind::SetComp { .. } => "set comprehension",
            ExprKind::SeqEnum(_) => "sequence enumeration",
            ExprKind::SeqComp { .. } => "sequence comprehension",
            ExprKind::Subseq { .. } => "subsequence",
            ExprKind::MapEnum(_) => "map enumeration",
            ExprKind::MapComp { .. } => "map comprehension",
            ExprKind::Tuple(_) => "tuple constructor",
            ExprKind::MkRecord { .. } => "record constructor",
            ExprKind::MkToken(_) => "token constructor",
            ExprKind::Mu { .. } => "mu expression",
            ExprKind::Field { .. } => "field expression",
            ExprKind::FieldNumber { .. } => "tuple selector",
            ExprKind::Apply { .. } => "apply expression",
            ExprKind::Instantiate { .. } => "function instantiation",
            ExprKind::Is { .. } => "is_ expression",
            ExprKind::Narrow { .. } => "narrow_ expression",
            ExprKind::IsOfClass { .. } => "isofclass expression",
            ExprKind::IsOfBaseClass { .. } => "isofbaseclass expression",
            ExprKind::SameClass { .. } => "sameclass expression",
            ExprKind::SameBaseClass { .. } => "samebaseclass expression",
            ExprKind::Pre { .. } => "pre_ expression",
            ExprKind::PreOp { .. } => "operation precondition",
            ExprKind::PostOp { .. } => "operation postcondition",
            ExprKind::History { .. } => "history expression",
        }
    }

    /// Direct sub-expressions, including those inside patterns and binds
    pub fn children(&self) -> Vec<&Expr<P>> {
        let mut out = Vec::new();
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Undefined
            | ExprKind::Variable { .. }
            | ExprKind::SelfRef
            | ExprKind::ThreadId
            | ExprKind::Time
            | ExprKind::NotYetSpecified
            | ExprKind::History { .. } => {}
            ExprKind::Unary { operand, .. } => out.push(operand.as_ref()),
            ExprKind::Binary { left, right, .. }
            | ExprKind::SetRange {
                first: left,
                last: right,
            }
            | ExprKind::SameClass { left, right }
            | ExprKind::SameBaseClass { left, right } => {
                out.push(left.as_ref());
                out.push(right.as_ref());
            }
            ExprKind::If {
                condition,
                then_branch,
                elseifs,
                else_branch,
            } => {
                out.push(condition.as_ref());
                out.push(then_branch.as_ref());
                for (cond, branch) in elseifs {
                    out.push(cond);
                    out.push(branch);
                }
                out.push(else_branch.as_ref());
            }
            ExprKind::Cases {
                scrutinee,
                alternatives,
                others,
            } => {
                out.push(scrutinee.as_ref());
                for alt in alternatives {
                    for pattern in &alt.patterns {
                        pattern.push_exprs(&mut out);
                    }
                    out.push(&alt.result);
                }
                if let Some(others) = others {
                    out.push(others.as_ref());
                }
            }
            ExprKind::Let { defs, body } | ExprKind::Def { defs, body } => {
                for def in defs {
                    def.pattern.push_exprs(&mut out);
                    out.push(&def.value);
                }
                out.push(body.as_ref());
            }
            ExprKind::LetBeSt { bind, filter, body } => {
                bind.push_exprs(&mut out);
                if let Some(filter) = filter {
                    out.push(filter.as_ref());
                }
                out.push(body.as_ref());
            }
            ExprKind::Forall { binds, predicate } | ExprKind::Exists { binds, predicate } => {
                for bind in binds {
                    bind.push_exprs(&mut out);
                }
                out.push(predicate.as_ref());
            }
            ExprKind::Exists1 { bind, predicate } | ExprKind::Iota { bind, predicate } => {
                bind.push_exprs(&mut out);
                out.push(predicate.as_ref());
            }
            ExprKind::Lambda { params, body } => {
                for param in params {
                    param.pattern.push_exprs(&mut out);
                }
                out.push(body.as_ref());
            }
            ExprKind::SetEnum(items) | ExprKind::SeqEnum(items) | ExprKind::Tuple(items) => {
                out.extend(items.iter());
            }
            ExprKind::SetComp {
                element,
                binds,
                predicate,
            } => {
                out.push(element.as_ref());
                for bind in binds {
                    bind.push_exprs(&mut out);
                }
                if let Some(predicate) = predicate {
                    out.push(predicate.as_ref());
                }
            }
            ExprKind::SeqComp {
                element,
                bind,
                predicate,
            } => {
                out.push(element.as_ref());
                bind.push_exprs(&mut out);
                if let Some(predicate) = predicate {
                    out.push(predicate.as_ref());
                }
            }
            ExprKind::Subseq { seq, from, to } => {
                out.push(seq.as_ref());
                out.push(from.as_ref());
                out.push(to.as_ref());
            }
            ExprKind::MapEnum(maplets) => {
                for maplet in maplets {
                    out.push(&maplet.key);
                    out.push(&maplet.value);
                }
            }
            ExprKind::MapComp {
                maplet,
                binds,
                predicate,
            } => {
                out.push(&maplet.key);
                out.push(&maplet.value);
                for bind in binds {
                    bind.push_exprs(&mut out);
                }
                if let Some(predicate) = predicate {
                    out.push(predicate.as_ref());
                }
            }
            ExprKind::MkRecord { args, .. } => out.extend(args.iter()),
            ExprKind::MkToken(inner) => out.push(inner.as_ref()),
            ExprKind::Mu {
                record,
                modifications,
            } => {
                out.push(record.as_ref());
                for (_, value) in modifications {
                    out.push(value);
                }
            }
            ExprKind::Field { object, .. } => out.push(object.as_ref()),
            ExprKind::FieldNumber { tuple, .. } => out.push(tuple.as_ref()),
            ExprKind::Apply { callee, args }
            | ExprKind::Pre {
                function: callee,
                args,
            } => {
                out.push(callee.as_ref());
                out.extend(args.iter());
            }
            ExprKind::Instantiate { function, .. } => out.push(function.as_ref()),
            ExprKind::Is { operand, .. }
            | ExprKind::Narrow { operand, .. }
            | ExprKind::IsOfClass { operand, .. }
            | ExprKind::IsOfBaseClass { operand, .. } => out.push(operand.as_ref()),
            ExprKind::PreOp { condition, errors } | ExprKind::PostOp { condition, errors } => {
                out.push(condition.as_ref());
                for err in errors {
                    out.push(&err.left);
                    out.push(&err.right);
                }
            }
        }
        out
    }

    /// Find the first node (pre-order) satisfying a predicate
    pub fn find(&self, pred: &dyn Fn(&Expr<P>) -> bool) -> Option<&Expr<P>> {
        if pred(self) {
            return Some(self);
        }
        self.children().into_iter().find_map(|child| child.find(pred))
    }

    /// Every variable name referenced anywhere below this node.
    ///
    /// This over-approximates the free variables (bound names are not
    /// subtracted), which is what closure capture needs.
    pub fn variable_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variable_names(&mut names);
        names
    }

    fn collect_variable_names(&self, names: &mut BTreeSet<String>) {
        if let ExprKind::Variable { name, .. } = &self.kind {
            names.insert(name.ident.clone());
            if name.module.is_some() {
                names.insert(name.to_string());
            }
        }
        for child in self.children() {
            child.collect_variable_names(names);
        }
    }

    /// Rebuild the tree in another phase.
    ///
    /// `info` computes each node's annotation from the source node; the first
    /// error aborts the whole mapping.
    pub fn map_phase<Q, E, F>(&self, info: &mut F) -> Result<Expr<Q>, E>
    where
        Q: Phase,
        F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
    {
        let node_info = info(self)?;
        let kind: ExprKind<Q> = match &self.kind {
            ExprKind::Literal(lit) => ExprKind::Literal(lit.clone()),
            ExprKind::Undefined => ExprKind::Undefined,
            ExprKind::Variable { name, old } => ExprKind::Variable {
                name: name.clone(),
                old: *old,
            },
            ExprKind::SelfRef => ExprKind::SelfRef,
            ExprKind::ThreadId => ExprKind::ThreadId,
            ExprKind::Time => ExprKind::Time,
            ExprKind::NotYetSpecified => ExprKind::NotYetSpecified,
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: map_box(operand, info)?,
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: map_box(left, info)?,
                right: map_box(right, info)?,
            },
            ExprKind::If {
                condition,
                then_branch,
                elseifs,
                else_branch,
            } => ExprKind::If {
                condition: map_box(condition, info)?,
                then_branch: map_box(then_branch, info)?,
                elseifs: elseifs
                    .iter()
                    .map(|(c, b)| Ok((c.map_phase::<Q, E, F>(info)?, b.map_phase::<Q, E, F>(info)?)))
                    .collect::<Result<_, E>>()?,
                else_branch: map_box(else_branch, info)?,
            },
            ExprKind::Cases {
                scrutinee,
                alternatives,
                others,
            } => ExprKind::Cases {
                scrutinee: map_box(scrutinee, info)?,
                alternatives: alternatives
                    .iter()
                    .map(|alt| {
                        Ok(CaseAlternative {
                            span: alt.span.clone(),
                            patterns: map_patterns(&alt.patterns, info)?,
                            result: alt.result.map_phase::<Q, E, F>(info)?,
                        })
                    })
                    .collect::<Result<_, E>>()?,
                others: map_opt(others, info)?,
            },
            ExprKind::Let { defs, body } => ExprKind::Let {
                defs: map_defs(defs, info)?,
                body: map_box(body, info)?,
            },
            ExprKind::Def { defs, body } => ExprKind::Def {
                defs: map_defs(defs, info)?,
                body: map_box(body, info)?,
            },
            ExprKind::LetBeSt { bind, filter, body } => ExprKind::LetBeSt {
                bind: bind.map_phase::<Q, E, F>(info)?,
                filter: map_opt(filter, info)?,
                body: map_box(body, info)?,
            },
            ExprKind::Forall { binds, predicate } => ExprKind::Forall {
                binds: map_binds(binds, info)?,
                predicate: map_box(predicate, info)?,
            },
            ExprKind::Exists { binds, predicate } => ExprKind::Exists {
                binds: map_binds(binds, info)?,
                predicate: map_box(predicate, info)?,
            },
            ExprKind::Exists1 { bind, predicate } => ExprKind::Exists1 {
                bind: bind.map_phase::<Q, E, F>(info)?,
                predicate: map_box(predicate, info)?,
            },
            ExprKind::Iota { bind, predicate } => ExprKind::Iota {
                bind: bind.map_phase::<Q, E, F>(info)?,
                predicate: map_box(predicate, info)?,
            },
            ExprKind::Lambda { params, body } => ExprKind::Lambda {
                params: params
                    .iter()
                    .map(|p| {
                        Ok(TypedParam {
                            pattern: p.pattern.map_phase::<Q, E, F>(info)?,
                            ty: p.ty.clone(),
                        })
                    })
                    .collect::<Result<_, E>>()?,
                body: Arc::new(body.map_phase::<Q, E, F>(info)?),
            },
            ExprKind::SetEnum(items) => ExprKind::SetEnum(map_vec(items, info)?),
            ExprKind::SetRange { first, last } => ExprKind::SetRange {
                first: map_box(first, info)?,
                last: map_box(last, info)?,
            },
            ExprKind::SetComp {
                element,
                binds,
                predicate,
            } => ExprKind::SetComp {
                element: map_box(element, info)?,
                binds: map_binds(binds, info)?,
                predicate: map_opt(predicate, info)?,
            },
            ExprKind::SeqEnum(items) => ExprKind::SeqEnum(map_vec(items, info)?),
            ExprKind::SeqComp {
                element,
                bind,
                predicate,
            } => ExprKind::SeqComp {
                element: map_box(element, info)?,
                bind: bind.map_phase::<Q, E, F>(info)?,
                predicate: map_opt(predicate, info)?,
            },
            ExprKind::Subseq { seq, from, to } => ExprKind::Subseq {
                seq: map_box(seq, info)?,
                from: map_box(from, info)?,
                to: map_box(to, info)?,
            },
            ExprKind::MapEnum(maplets) => ExprKind::MapEnum(
                maplets
                    .iter()
                    .map(|m| m.map_phase::<Q, E, F>(info))
                    .collect::<Result<_, E>>()?,
            ),
            ExprKind::MapComp {
                maplet,
                binds,
                predicate,
            } => ExprKind::MapComp {
                maplet: Box::new(maplet.map_phase::<Q, E, F>(info)?),
                binds: map_binds(binds, info)?,
                predicate: map_opt(predicate, info)?,
            },
            ExprKind::Tuple(items) => ExprKind::Tuple(map_vec(items, info)?),
            ExprKind::MkRecord { record, args } => ExprKind::MkRecord {
                record: record.clone(),
                args: map_vec(args, info)?,
            },
            ExprKind::MkToken(inner) => ExprKind::MkToken(map_box(inner, info)?),
            ExprKind::Mu {
                record,
                modifications,
            } => ExprKind::Mu {
                record: map_box(record, info)?,
                modifications: modifications
                    .iter()
                    .map(|(tag, value)| Ok((tag.clone(), value.map_phase::<Q, E, F>(info)?)))
                    .collect::<Result<_, E>>()?,
            },
            ExprKind::Field { object, field } => ExprKind::Field {
                object: map_box(object, info)?,
                field: field.clone(),
            },
            ExprKind::FieldNumber { tuple, index } => ExprKind::FieldNumber {
                tuple: map_box(tuple, info)?,
                index: *index,
            },
            ExprKind::Apply { callee, args } => ExprKind::Apply {
                callee: map_box(callee, info)?,
                args: map_vec(args, info)?,
            },
            ExprKind::Instantiate { function, actuals } => ExprKind::Instantiate {
                function: map_box(function, info)?,
                actuals: actuals.clone(),
            },
            ExprKind::Is { ty, operand } => ExprKind::Is {
                ty: ty.clone(),
                operand: map_box(operand, info)?,
            },
            ExprKind::Narrow { ty, operand } => ExprKind::Narrow {
                ty: ty.clone(),
                operand: map_box(operand, info)?,
            },
            ExprKind::IsOfClass { class, operand } => ExprKind::IsOfClass {
                class: class.clone(),
                operand: map_box(operand, info)?,
            },
            ExprKind::IsOfBaseClass { class, operand } => ExprKind::IsOfBaseClass {
                class: class.clone(),
                operand: map_box(operand, info)?,
            },
            ExprKind::SameClass { left, right } => ExprKind::SameClass {
                left: map_box(left, info)?,
                right: map_box(right, info)?,
            },
            ExprKind::SameBaseClass { left, right } => ExprKind::SameBaseClass {
                left: map_box(left, info)?,
                right: map_box(right, info)?,
            },
            ExprKind::Pre { function, args } => ExprKind::Pre {
                function: map_box(function, info)?,
                args: map_vec(args, info)?,
            },
            ExprKind::PreOp { condition, errors } => ExprKind::PreOp {
                condition: map_box(condition, info)?,
                errors: map_errors(errors, info)?,
            },
            ExprKind::PostOp { condition, errors } => ExprKind::PostOp {
                condition: map_box(condition, info)?,
                errors: map_errors(errors, info)?,
            },
            ExprKind::History { op, operations } => ExprKind::History {
                op: *op,
                operations: operations.clone(),
            },
        };

        Ok(Expr {
            id: self.id,
            span: self.span.clone(),
            kind,
            info: node_info,
        })
    }
}

impl<P: Phase> Pattern<P> {
    fn push_exprs<'a>(&'a self, out: &mut Vec<&'a Expr<P>>) {
        match &self.kind {
            PatternKind::Expression(expr) => out.push(expr.as_ref()),
            PatternKind::Identifier(_) | PatternKind::Ignore | PatternKind::Literal(_) => {}
            PatternKind::Tuple(items)
            | PatternKind::Record { fields: items, .. }
            | PatternKind::Set(items)
            | PatternKind::Seq(items) => {
                for item in items {
                    item.push_exprs(out);
                }
            }
            PatternKind::Union(l, r) | PatternKind::Concat(l, r) | PatternKind::MapUnion(l, r) => {
                l.push_exprs(out);
                r.push_exprs(out);
            }
            PatternKind::Map(maplets) => {
                for (k, v) in maplets {
                    k.push_exprs(out);
                    v.push_exprs(out);
                }
            }
        }
    }

    /// Rebuild the pattern in another phase
    pub fn map_phase<Q, E, F>(&self, info: &mut F) -> Result<Pattern<Q>, E>
    where
        Q: Phase,
        F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
    {
        let kind: PatternKind<Q> = match &self.kind {
            PatternKind::Identifier(name) => PatternKind::Identifier(name.clone()),
            PatternKind::Ignore => PatternKind::Ignore,
            PatternKind::Literal(lit) => PatternKind::Literal(lit.clone()),
            PatternKind::Expression(expr) => PatternKind::Expression(map_box(expr, info)?),
            PatternKind::Tuple(items) => PatternKind::Tuple(map_patterns(items, info)?),
            PatternKind::Record { record, fields } => PatternKind::Record {
                record: record.clone(),
                fields: map_patterns(fields, info)?,
            },
            PatternKind::Set(items) => PatternKind::Set(map_patterns(items, info)?),
            PatternKind::Seq(items) => PatternKind::Seq(map_patterns(items, info)?),
            PatternKind::Union(l, r) => PatternKind::Union(
                Box::new(l.map_phase::<Q, E, F>(info)?),
                Box::new(r.map_phase::<Q, E, F>(info)?),
            ),
            PatternKind::Concat(l, r) => PatternKind::Concat(
                Box::new(l.map_phase::<Q, E, F>(info)?),
                Box::new(r.map_phase::<Q, E, F>(info)?),
            ),
            PatternKind::Map(maplets) => PatternKind::Map(
                maplets
                    .iter()
                    .map(|(k, v)| Ok((k.map_phase::<Q, E, F>(info)?, v.map_phase::<Q, E, F>(info)?)))
                    .collect::<Result<_, E>>()?,
            ),
            PatternKind::MapUnion(l, r) => PatternKind::MapUnion(
                Box::new(l.map_phase::<Q, E, F>(info)?),
                Box::new(r.map_phase::<Q, E, F>(info)?),
            ),
        };
        Ok(Pattern {
            span: self.span.clone(),
            kind,
        })
    }
}

impl<P: Phase> Bind<P> {
    fn push_exprs<'a>(&'a self, out: &mut Vec<&'a Expr<P>>) {
        match self {
            Bind::Set { pattern, set } => {
                pattern.push_exprs(out);
                out.push(set.as_ref());
            }
            Bind::Seq { pattern, seq } => {
                pattern.push_exprs(out);
                out.push(seq.as_ref());
            }
            Bind::Type { pattern, .. } => pattern.push_exprs(out),
        }
    }

    pub fn map_phase<Q, E, F>(&self, info: &mut F) -> Result<Bind<Q>, E>
    where
        Q: Phase,
        F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
    {
        Ok(match self {
            Bind::Set { pattern, set } => Bind::Set {
                pattern: pattern.map_phase::<Q, E, F>(info)?,
                set: map_box(set, info)?,
            },
            Bind::Seq { pattern, seq } => Bind::Seq {
                pattern: pattern.map_phase::<Q, E, F>(info)?,
                seq: map_box(seq, info)?,
            },
            Bind::Type { pattern, ty } => Bind::Type {
                pattern: pattern.map_phase::<Q, E, F>(info)?,
                ty: ty.clone(),
            },
        })
    }
}

impl<P: Phase> MultipleBind<P> {
    fn push_exprs<'a>(&'a self, out: &mut Vec<&'a Expr<P>>) {
        for pattern in self.patterns() {
            pattern.push_exprs(out);
        }
        match self {
            MultipleBind::Set { set, .. } => out.push(set.as_ref()),
            MultipleBind::Seq { seq, .. } => out.push(seq.as_ref()),
            MultipleBind::Type { .. } => {}
        }
    }

    pub fn map_phase<Q, E, F>(&self, info: &mut F) -> Result<MultipleBind<Q>, E>
    where
        Q: Phase,
        F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
    {
        Ok(match self {
            MultipleBind::Set { patterns, set } => MultipleBind::Set {
                patterns: map_patterns(patterns, info)?,
                set: map_box(set, info)?,
            },
            MultipleBind::Seq { patterns, seq } => MultipleBind::Seq {
                patterns: map_patterns(patterns, info)?,
                seq: map_box(seq, info)?,
            },
            MultipleBind::Type { patterns, ty } => MultipleBind::Type {
                patterns: map_patterns(patterns, info)?,
                ty: ty.clone(),
            },
        })
    }
}

impl<P: Phase> Maplet<P> {
    fn map_phase<Q, E, F>(&self, info: &mut F) -> Result<Maplet<Q>, E>
    where
        Q: Phase,
        F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
    {
        Ok(Maplet {
            key: self.key.map_phase::<Q, E, F>(info)?,
            value: self.value.map_phase::<Q, E, F>(info)?,
        })
    }
}

fn map_box<P, Q, E, F>(expr: &Expr<P>, info: &mut F) -> Result<Box<Expr<Q>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    Ok(Box::new(expr.map_phase::<Q, E, F>(info)?))
}

fn map_opt<P, Q, E, F>(expr: &Option<Box<Expr<P>>>, info: &mut F) -> Result<Option<Box<Expr<Q>>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    expr.as_ref().map(|e| map_box(e, info)).transpose()
}

fn map_vec<P, Q, E, F>(exprs: &[Expr<P>], info: &mut F) -> Result<Vec<Expr<Q>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    exprs.iter().map(|e| e.map_phase::<Q, E, F>(info)).collect()
}

fn map_patterns<P, Q, E, F>(patterns: &[Pattern<P>], info: &mut F) -> Result<Vec<Pattern<Q>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    patterns.iter().map(|p| p.map_phase::<Q, E, F>(info)).collect()
}

fn map_binds<P, Q, E, F>(binds: &[MultipleBind<P>], info: &mut F) -> Result<Vec<MultipleBind<Q>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    binds.iter().map(|b| b.map_phase::<Q, E, F>(info)).collect()
}

fn map_defs<P, Q, E, F>(defs: &[LocalDef<P>], info: &mut F) -> Result<Vec<LocalDef<Q>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    defs.iter()
        .map(|def| {
            Ok(LocalDef {
                span: def.span.clone(),
                pattern: def.pattern.map_phase::<Q, E, F>(info)?,
                ty: def.ty.clone(),
                value: def.value.map_phase::<Q, E, F>(info)?,
            })
        })
        .collect()
}

fn map_errors<P, Q, E, F>(errors: &[ErrorCase<P>], info: &mut F) -> Result<Vec<ErrorCase<Q>>, E>
where
    P: Phase,
    Q: Phase,
    F: FnMut(&Expr<P>) -> Result<Q::Info, E>,
{
    errors
        .iter()
        .map(|err| {
            Ok(ErrorCase {
                name: err.name.clone(),
                left: err.left.map_phase::<Q, E, F>(info)?,
                right: err.right.map_phase::<Q, E, F>(info)?,
            })
        })
        .collect()
}
