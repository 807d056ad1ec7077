//! Derived physics quantities: response and asymmetry estimators.
//!
//! Pure functions of the canonical Tag/Probe/Activity/MET columns, built on
//! the transverse-plane polar vector. A zero tag (or probe) momentum
//! reaching an estimator is a `DivisionDomain` error that aborts the run;
//! the selection cascades are expected to cut such events upstream.

use std::sync::Arc;

use jc_columnar::{Analyzer, ColumnType, ColumnValue, Expr, NativeFn, NodeId};
use jc_core::{Error, PolarVec2, Result, delta_phi};

/// MET column pairs consulted for the projection responses, in preference
/// order.
const MET_COLUMNS: [(&str, &str); 2] =
    [("PuppiMET_pt", "PuppiMET_phi"), ("RawPuppiMET_pt", "RawPuppiMET_phi")];

fn nonzero(name: &str, value: f64) -> Result<f64> {
    if value == 0.0 {
        Err(Error::DivisionDomain(format!("{name} == 0")))
    } else {
        Ok(value)
    }
}

/// `Probe_pt / Tag_pt`.
fn ratio_fn() -> NativeFn {
    Arc::new(|deps, _ctx| {
        let probe = deps[0].as_f64()?;
        let tag = nonzero("Tag_pt", deps[1].as_f64()?)?;
        Ok(ColumnValue::F64(probe / tag))
    })
}

/// `-(Tag . Probe) / |Tag|^2`.
fn direct_balance_fn() -> NativeFn {
    Arc::new(|deps, _ctx| {
        let tag = PolarVec2::new(deps[0].as_f64()?, deps[1].as_f64()?);
        let probe = PolarVec2::new(deps[2].as_f64()?, deps[3].as_f64()?);
        let denom = nonzero("Tag_pt", tag.mag)?;
        Ok(ColumnValue::F64(-tag.dot(&probe) / (denom * denom)))
    })
}

/// `1 + (MET . Ref) / |Ref|^2`, the missing-transverse-energy projection.
fn mpf_fn() -> NativeFn {
    Arc::new(|deps, _ctx| {
        let met = PolarVec2::new(deps[0].as_f64()?, deps[1].as_f64()?);
        let reference = PolarVec2::new(deps[2].as_f64()?, deps[3].as_f64()?);
        let denom = nonzero("reference pt", reference.mag)?;
        Ok(ColumnValue::F64(1.0 + met.dot(&reference) / (denom * denom)))
    })
}

/// Corrected response: subtracts the activity projection and removes the
/// back-to-back geometry factor.
fn hdm_fn() -> NativeFn {
    Arc::new(|deps, _ctx| {
        let db_direct = deps[0].as_f64()?;
        let mpf = deps[1].as_f64()?;
        let activity = PolarVec2::new(deps[2].as_f64()?, deps[3].as_f64()?);
        let reference = PolarVec2::new(deps[4].as_f64()?, deps[5].as_f64()?);
        let probe_phi = deps[6].as_f64()?;
        let denom = nonzero("reference pt", reference.mag)?;
        let unclustered = activity.dot(&reference) / (denom * denom);
        let geometry = delta_phi(reference.phi, probe_phi).cos();
        Ok(ColumnValue::F64((db_direct + mpf - 1.0 + unclustered) / geometry))
    })
}

/// `(Probe_pt - Tag_pt) / (Probe_pt + Tag_pt)`.
fn asymmetry_fn() -> NativeFn {
    Arc::new(|deps, _ctx| {
        let probe = deps[0].as_f64()?;
        let tag = deps[1].as_f64()?;
        let denom = nonzero("Probe_pt + Tag_pt", probe + tag)?;
        Ok(ColumnValue::F64((probe - tag) / denom))
    })
}

/// `Probe_rawPt * fraction / Tag_pt`, the energy-fraction balance.
fn efb_fn() -> NativeFn {
    Arc::new(|deps, _ctx| {
        let raw = deps[0].as_f64()?;
        let fraction = deps[1].as_f64()?;
        let tag = nonzero("Tag_pt", deps[2].as_f64()?)?;
        Ok(ColumnValue::F64(raw * fraction / tag))
    })
}

/// Energy fractions with a balance estimator.
pub const EF_FRACTIONS: &[&str] = &["chEmEF", "chHEF", "hfEmEF", "hfHEF", "muEF", "neEmEF", "neHEF"];

/// Define every response estimator available on this node's schema.
///
/// Always defines `DB_ratio`, `DB_direct`, and `Asymmetry`; adds raw
/// variants when raw momenta exist, MPF/HDM variants when a MET vector
/// exists, and `EFB_<fraction>` for each mirrored probe fraction.
pub fn define_responses(analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId> {
    let mut node = analyzer.define(
        node,
        "DB_ratio",
        Expr::func("response_db_ratio", &["Probe_pt", "Tag_pt"], ColumnType::F64, ratio_fn()),
    )?;
    node = analyzer.define(
        node,
        "DB_direct",
        Expr::func(
            "response_db_direct",
            &["Tag_pt", "Tag_phi", "Probe_pt", "Probe_phi"],
            ColumnType::F64,
            direct_balance_fn(),
        ),
    )?;
    node = analyzer.define(
        node,
        "Asymmetry",
        Expr::func("response_asymmetry", &["Probe_pt", "Tag_pt"], ColumnType::F64, asymmetry_fn()),
    )?;

    let has_raw =
        analyzer.is_defined(node, "Probe_rawPt") && analyzer.is_defined(node, "Tag_rawPt");
    if has_raw {
        node = analyzer.define(
            node,
            "DB_raw_ratio",
            Expr::func(
                "response_db_ratio",
                &["Probe_rawPt", "Tag_rawPt"],
                ColumnType::F64,
                ratio_fn(),
            ),
        )?;
        node = analyzer.define(
            node,
            "DB_raw_direct",
            Expr::func(
                "response_db_direct",
                &["Tag_rawPt", "Tag_phi", "Probe_rawPt", "Probe_phi"],
                ColumnType::F64,
                direct_balance_fn(),
            ),
        )?;
    }

    let met = MET_COLUMNS
        .iter()
        .copied()
        .find(|(pt, phi)| analyzer.is_defined(node, pt) && analyzer.is_defined(node, phi));
    if let Some((met_pt, met_phi)) = met {
        node = analyzer.define(
            node,
            "MPF_tag",
            Expr::func(
                "response_mpf",
                &[met_pt, met_phi, "Tag_pt", "Tag_phi"],
                ColumnType::F64,
                mpf_fn(),
            ),
        )?;
        node = analyzer.define(
            node,
            "MPF_probe",
            Expr::func(
                "response_mpf",
                &[met_pt, met_phi, "Probe_pt", "Probe_phi"],
                ColumnType::F64,
                mpf_fn(),
            ),
        )?;
        if analyzer.is_defined(node, "JetActivity_pt") {
            node = analyzer.define(
                node,
                "HDM_tag",
                Expr::func(
                    "response_hdm",
                    &[
                        "DB_direct",
                        "MPF_tag",
                        "JetActivity_pt",
                        "JetActivity_phi",
                        "Tag_pt",
                        "Tag_phi",
                        "Probe_phi",
                    ],
                    ColumnType::F64,
                    hdm_fn(),
                ),
            )?;
        }
    }

    for fraction in EF_FRACTIONS {
        let probe_col = format!("Probe_{fraction}");
        if !analyzer.is_defined(node, &probe_col) {
            continue;
        }
        let deps = ["Probe_rawPt", probe_col.as_str(), "Tag_pt"];
        node = analyzer.define(
            node,
            &format!("EFB_{fraction}"),
            Expr::func("response_efb", &deps, ColumnType::F64, efb_fn()),
        )?;
    }

    Ok(node)
}
