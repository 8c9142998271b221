//! # Instance Input
//!
//! Reads OPB and DIMACS WCNF files into a [`Problem`]. Constraints are read
//! through the `rustsat` file parsers. Clauses, cardinality and
//! pseudo-Boolean constraints each become one [`LinearConstraint`], soft
//! clauses become objective literals.

use std::{ffi::OsString, fmt, path::Path};

use itertools::Itertools;

use rustsat::{
    instances::{fio, ManageVars, MultiOptInstance, Objective},
    types::{
        constraints::{CardConstraint, PbConstraint},
        Clause, Lit, RsHashMap, Var,
    },
};

use crate::types::{self, LinearConstraint, LinearObjective, Problem, Solution};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FileFormat {
    /// Infer the file format from the file extension. `.wcnf`, `.cnf` or
    /// `.dimacs` are interpreted as DIMACS files and `.opb` as an OPB file.
    /// All file extensions can also be appended with `.bz2`, `.gz` or `.xz`
    /// if compression is used.
    Infer,
    /// A DIMACS WCNF file
    Dimacs,
    /// An OPB file
    Opb,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Infer => write!(f, "infer"),
            FileFormat::Dimacs => write!(f, "dimacs"),
            FileFormat::Opb => write!(f, "opb"),
        }
    }
}

macro_rules! is_one_of {
    ($a:expr, $($b:expr),*) => {
        $( $a == $b || )* false
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Cannot infer file format from extension {0:?}")]
    UnknownFileExtension(OsString),
    #[error("To infer the file format, the file needs to have a file extension")]
    NoFileExtension,
    #[error("Expected at most one objective, found {0}")]
    MultipleObjectives(usize),
}

/// A parsed instance
#[derive(Clone, Debug)]
pub struct Parsed {
    pub problem: Problem,
    /// Number of variables in the file, variables above are auxiliary
    pub n_orig_vars: usize,
}

impl Parsed {
    /// The values of the variables that appear in the file
    pub fn original_values<'sol>(&self, sol: &'sol Solution) -> &'sol [bool] {
        &sol.values()[..self.n_orig_vars.min(sol.len())]
    }
}

fn infer_format(inst_path: &Path) -> anyhow::Result<FileFormat> {
    let Some(ext) = inst_path.extension() else {
        anyhow::bail!(Error::NoFileExtension)
    };
    let path_without_compr = inst_path.with_extension("");
    let ext = if is_one_of!(ext, "gz", "bz2", "xz") {
        // Strip compression extension
        match path_without_compr.extension() {
            Some(ext) => ext,
            None => anyhow::bail!(Error::NoFileExtension),
        }
    } else {
        ext
    };
    if is_one_of!(ext, "wcnf", "cnf", "dimacs") {
        Ok(FileFormat::Dimacs)
    } else if is_one_of!(ext, "opb") {
        Ok(FileFormat::Opb)
    } else {
        anyhow::bail!(Error::UnknownFileExtension(OsString::from(ext)))
    }
}

pub fn parse<P: AsRef<Path>>(
    inst_path: P,
    file_format: FileFormat,
    opb_opts: fio::opb::Options,
) -> anyhow::Result<Parsed> {
    let inst_path = inst_path.as_ref();
    let file_format = match file_format {
        FileFormat::Infer => infer_format(inst_path)?,
        format => format,
    };
    let inst: MultiOptInstance = match file_format {
        FileFormat::Dimacs => MultiOptInstance::from_dimacs_path(inst_path)?,
        _ => MultiOptInstance::from_opb_path(inst_path, opb_opts)?,
    };
    let (constr, mut objs) = inst.decompose();
    if objs.len() > 1 {
        anyhow::bail!(Error::MultipleObjectives(objs.len()));
    }
    let mut n_orig_vars = constr.max_var().map_or(0, |v| v.idx() + 1);
    let mut cards = vec![];
    let mut pbs = vec![];
    let (cnf, mut vm) = constr.into_cnf_with_encoders(
        |card, _, _| cards.push(card),
        |pb: PbConstraint, cnf, _| {
            if pb.is_clause() {
                if let Ok(cl) = pb.into_clause() {
                    cnf.add_clause(cl);
                }
            } else {
                pbs.push(pb);
            }
        },
    );
    let mut clauses: Vec<Clause> = cnf.into_iter().collect();
    let (terms, offset) = match objs.pop() {
        Some(obj) => process_objective(obj, &mut clauses, &mut vm, &mut n_orig_vars)?,
        None => (vec![], 0),
    };
    let n_vars = vm
        .max_var()
        .map_or(0, |v| v.idx() + 1)
        .max(n_orig_vars)
        .max(terms.iter().map(|(l, _)| l.var().idx() + 1).max().unwrap_or(0));

    let mut problem = Problem::new(n_vars);
    for cl in clauses {
        if let Some(lits) = normalize_clause(&cl) {
            problem.add_constraint(LinearConstraint::clause(lits));
        }
    }
    for card in cards {
        problem.add_constraint(card_constraint(card)?);
    }
    for pb in pbs {
        problem.add_constraint(pb_constraint(pb)?);
    }
    problem.set_objective(LinearObjective::minimize(terms).with_offset(offset));
    Ok(Parsed {
        problem,
        n_orig_vars,
    })
}

/// Sorts and deduplicates the literals of a clause, `None` for tautologies
fn normalize_clause(cl: &Clause) -> Option<Vec<Lit>> {
    let lits: Vec<Lit> = cl.iter().copied().sorted_unstable().dedup().collect();
    if lits.windows(2).any(|w| w[0].var() == w[1].var()) {
        return None;
    }
    Some(lits)
}

/// Merges terms over the same variable into a single term over the positive
/// literal, returning the constant that negative literals contribute
fn merge_terms<I>(terms: I) -> anyhow::Result<(Vec<(Lit, i64)>, i64)>
where
    I: IntoIterator<Item = (Lit, usize)>,
{
    let overflow = || types::Error::Overflow(String::from("a constraint"));
    let mut constant: i64 = 0;
    let mut coeffs: RsHashMap<Var, i64> = RsHashMap::default();
    for (l, w) in terms {
        let w = i64::try_from(w).map_err(|_| overflow())?;
        let coeff = coeffs.entry(l.var()).or_insert(0);
        if l.is_pos() {
            *coeff = coeff.checked_add(w).ok_or_else(overflow)?;
        } else {
            // w * !x = w - w * x
            constant = constant.checked_add(w).ok_or_else(overflow)?;
            *coeff = coeff.checked_sub(w).ok_or_else(overflow)?;
        }
    }
    let mut terms: Vec<(Lit, i64)> = coeffs
        .into_iter()
        .filter(|&(_, c)| c != 0)
        .map(|(v, c)| (v.pos_lit(), c))
        .collect();
    terms.sort_unstable();
    Ok((terms, constant))
}

/// A linear constraint `lb <= sum <= ub` over merged terms
fn merged_constraint<I>(
    terms: I,
    lb: Option<i64>,
    ub: Option<i64>,
) -> anyhow::Result<LinearConstraint>
where
    I: IntoIterator<Item = (Lit, usize)>,
{
    let (terms, constant) = merge_terms(terms)?;
    let shift = |b: i64| {
        b.checked_sub(constant)
            .ok_or_else(|| types::Error::Overflow(String::from("a constraint bound")))
    };
    Ok(LinearConstraint::new(
        terms,
        lb.map(shift).transpose()?,
        ub.map(shift).transpose()?,
    ))
}

fn card_constraint(card: CardConstraint) -> anyhow::Result<LinearConstraint> {
    let bound = |b: usize| {
        i64::try_from(b).map_err(|_| types::Error::Overflow(String::from("a constraint bound")))
    };
    let unit = |lits: Vec<Lit>| lits.into_iter().map(|l| (l, 1));
    match card {
        CardConstraint::Ub(constr) => {
            let (lits, b) = constr.decompose();
            merged_constraint(unit(lits), None, Some(bound(b)?))
        }
        CardConstraint::Lb(constr) => {
            let (lits, b) = constr.decompose();
            merged_constraint(unit(lits), Some(bound(b)?), None)
        }
        CardConstraint::Eq(constr) => {
            let (lits, b) = constr.decompose();
            let b = bound(b)?;
            merged_constraint(unit(lits), Some(b), Some(b))
        }
    }
}

fn pb_constraint(pb: PbConstraint) -> anyhow::Result<LinearConstraint> {
    let bound = |b: isize| {
        i64::try_from(b).map_err(|_| types::Error::Overflow(String::from("a constraint bound")))
    };
    match pb {
        PbConstraint::Ub(constr) => {
            let (lits, b) = constr.decompose();
            merged_constraint(lits, None, Some(bound(b)?))
        }
        PbConstraint::Lb(constr) => {
            let (lits, b) = constr.decompose();
            merged_constraint(lits, Some(bound(b)?), None)
        }
        PbConstraint::Eq(constr) => {
            let (lits, b) = constr.decompose();
            let b = bound(b)?;
            merged_constraint(lits, Some(b), Some(b))
        }
    }
}

/// Turns the soft clauses of an objective into objective terms over
/// positive literals. Non-unit soft clauses are relaxed by a fresh blocking
/// literal. Variables of unit soft clauses count as original variables.
fn process_objective<VM: ManageVars>(
    obj: Objective,
    clauses: &mut Vec<Clause>,
    vm: &mut VM,
    n_orig_vars: &mut usize,
) -> anyhow::Result<(Vec<(Lit, i64)>, i64)> {
    let (soft_cls, offset) = obj.into_soft_cls();
    let mut offset = i64::try_from(offset)
        .map_err(|_| types::Error::Overflow(String::from("the objective offset")))?;
    let mut blits: RsHashMap<Clause, Lit> = RsHashMap::default();
    let mut coeffs: RsHashMap<Var, i64> = RsHashMap::default();
    for (mut cl, w) in soft_cls {
        let w = i64::try_from(w)
            .map_err(|_| types::Error::Overflow(String::from("the objective")))?;
        let cost_lit = if cl.len() == 1 {
            *n_orig_vars = (*n_orig_vars).max(cl[0].var().idx() + 1);
            !cl[0]
        } else if let Some(&blit) = blits.get(&cl) {
            blit
        } else {
            let blit = vm.new_var().pos_lit();
            blits.insert(cl.clone(), blit);
            cl.add(blit);
            clauses.push(cl);
            blit
        };
        let coeff = coeffs.entry(cost_lit.var()).or_insert(0);
        if cost_lit.is_pos() {
            *coeff += w;
        } else {
            // w * !x = w - w * x
            offset += w;
            *coeff -= w;
        }
    }
    let mut terms: Vec<(Lit, i64)> = coeffs
        .into_iter()
        .filter(|&(_, c)| c != 0)
        .map(|(v, c)| (v.pos_lit(), c))
        .collect();
    terms.sort_unstable();
    Ok((terms, offset))
}

#[cfg(test)]
mod tests {
    use rustsat::{
        clause, lit,
        types::constraints::{CardConstraint, PbConstraint},
    };

    use super::{card_constraint, normalize_clause, pb_constraint};
    use crate::types::LinearConstraint;

    #[test]
    fn cardinality_and_pb_rows() {
        let card = CardConstraint::new_ub(vec![lit![0], !lit![1], lit![2]], 1);
        assert_eq!(
            card_constraint(card).unwrap(),
            LinearConstraint::at_most(vec![(lit![0], 1), (lit![1], -1), (lit![2], 1)], 0)
        );
        let card = CardConstraint::new_eq(vec![lit![0], lit![1]], 1);
        assert_eq!(
            card_constraint(card).unwrap(),
            LinearConstraint::equal(vec![(lit![0], 1), (lit![1], 1)], 1)
        );
        // 3 x0 + 2 !x1 >= 2, i.e. 3 x0 - 2 x1 >= 0
        let pb = PbConstraint::new_lb(vec![(lit![0], 3), (!lit![1], 2)], 2);
        let constr = pb_constraint(pb).unwrap();
        assert_eq!(
            constr,
            LinearConstraint::at_least(vec![(lit![0], 3), (lit![1], -2)], 0)
        );
        for (values, sat) in [
            ([false, false], true),
            ([false, true], false),
            ([true, true], true),
        ] {
            assert_eq!(constr.is_satisfied(&values), sat);
        }
    }

    #[test]
    fn clause_normalization() {
        assert_eq!(
            normalize_clause(&clause![lit![2], lit![0], lit![2]]),
            Some(vec![lit![0], lit![2]])
        );
        assert_eq!(normalize_clause(&clause![lit![1], !lit![1], lit![0]]), None);
    }
}
