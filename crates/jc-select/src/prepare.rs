//! Channel-independent event preparation.
//!
//! Applied once to the root chain before any branch forks: the per-event
//! weight, raw jet momenta, optional re-application of jet energy
//! corrections through the external evaluator, the golden-lumi filter, the
//! veto-map flag column, and the detector-quality flag cut. The node this
//! returns becomes the `all` branch.

use std::sync::Arc;

use jc_columnar::{Analyzer, ColumnType, ColumnValue, Expr, NodeId, Pred};
use jc_core::{
    CorrectionEvaluator, CorrectionInput, CorrectionSet, Error, LumiMask, Result, VetoMap,
};

/// Detector-quality event flags required when present.
const QUALITY_FLAGS: &[&str] = &[
    "Flag_goodVertices",
    "Flag_globalSuperTightHalo2016Filter",
    "Flag_EcalDeadCellTriggerPrimitiveFilter",
    "Flag_BadPFMuonFilter",
    "Flag_BadPFMuonDzFilter",
    "Flag_hfNoisyHitsFilter",
    "Flag_eeBadScFilter",
    "Flag_ecalBadCalibFilter",
];

/// Preparation configuration.
#[derive(Clone, Default)]
pub struct PrepareConfig {
    /// Whether the input is simulation (uses `genWeight` as the event
    /// weight).
    pub is_mc: bool,
    /// Corrections to re-apply to the jet collection.
    pub corrections: Option<(CorrectionSet, Arc<dyn CorrectionEvaluator>)>,
    /// Golden-lumi allow-list.
    pub lumi_mask: Option<Arc<dyn LumiMask>>,
    /// Detector-region veto map.
    pub veto_map: Option<Arc<dyn VetoMap>>,
    /// Apply the detector-quality flag cut (when the flags exist).
    pub apply_flag_cut: bool,
}

/// Run the preparation chain from the root; returns the prepared node.
pub fn prepare(analyzer: &mut Analyzer, config: &PrepareConfig) -> Result<NodeId> {
    let mut node = analyzer.root();

    // Per-event weight: genWeight for MC, unity for data.
    let weight_expr = if config.is_mc && analyzer.is_defined(node, "genWeight") {
        Expr::formula("genWeight")
    } else {
        Expr::constant(ColumnValue::F64(1.0))
    };
    node = analyzer.define(node, "weight", weight_expr)?;

    // Raw (uncorrected) jet momenta.
    let raw_expr = if analyzer.is_defined(node, "Jet_rawFactor") {
        Expr::map("Jet_pt * (1.0 - Jet_rawFactor)")
    } else {
        Expr::map("Jet_pt")
    };
    node = analyzer.define(node, "Jet_rawPt", raw_expr)?;

    if let Some((set, evaluator)) = &config.corrections {
        if !set.is_empty() {
            node = redo_corrections(analyzer, node, set, Arc::clone(evaluator))?;
        }
    }

    if let Some(mask) = &config.lumi_mask {
        node = golden_lumi_filter(analyzer, node, Arc::clone(mask))?;
    }

    // Veto flag per jet; all-clear when no map is configured.
    let veto_expr = match &config.veto_map {
        Some(map) => {
            let map = Arc::clone(map);
            Expr::func(
                "veto_map_lookup",
                &["Jet_eta", "Jet_phi"],
                ColumnType::VecBool,
                Arc::new(move |deps, _ctx| {
                    let etas = deps[0].f64_seq()?;
                    let phis = deps[1].f64_seq()?;
                    Ok(ColumnValue::VecBool(
                        etas.iter().zip(phis.iter()).map(|(&e, &p)| map.is_vetoed(e, p)).collect(),
                    ))
                }),
            )
        }
        None => Expr::func(
            "veto_map_all_clear",
            &["Jet_eta"],
            ColumnType::VecBool,
            Arc::new(|deps, _ctx| {
                let n = deps[0].seq_len().unwrap_or(0);
                Ok(ColumnValue::VecBool(vec![false; n]))
            }),
        ),
    };
    node = analyzer.define(node, "Jet_vetoed", veto_expr)?;

    if config.apply_flag_cut {
        let present: Vec<&str> = QUALITY_FLAGS
            .iter()
            .copied()
            .filter(|f| analyzer.is_defined(node, f))
            .collect();
        if !present.is_empty() {
            node = analyzer.filter(
                node,
                "detector quality flags",
                Pred::formula(&present.join(" && ")),
            )?;
        }
    }

    Ok(node)
}

/// Re-apply jet energy corrections: a per-jet factor from the external
/// evaluator, corrected momenta, and the matching raw-factor redefinition.
fn redo_corrections(
    analyzer: &mut Analyzer,
    node: NodeId,
    set: &CorrectionSet,
    evaluator: Arc<dyn CorrectionEvaluator>,
) -> Result<NodeId> {
    let has_area = analyzer.is_defined(node, "Jet_area");
    let has_rho = analyzer.is_defined(node, "Rho_fixedGridRhoFastjetAll");
    let mut deps = vec!["Jet_rawPt", "Jet_eta"];
    if has_area {
        deps.push("Jet_area");
    }
    if has_rho {
        deps.push("Rho_fixedGridRhoFastjetAll");
    }

    let levels: Vec<_> = set.levels().iter().map(|l| l.kind).collect();
    tracing::debug!(?levels, "re-applying jet energy corrections");
    let func = {
        let levels = levels.clone();
        move |deps: &[&ColumnValue], _ctx: &jc_columnar::EventCtx| -> Result<ColumnValue> {
            let pts = deps[0].f64_seq()?;
            let etas = deps[1].f64_seq()?;
            let areas = if has_area { Some(deps[2].f64_seq()?) } else { None };
            let rho = if has_rho {
                deps[if has_area { 3 } else { 2 }].as_f64()?
            } else {
                0.0
            };
            let mut factors = Vec::with_capacity(pts.len());
            for i in 0..pts.len() {
                let input = CorrectionInput {
                    pt: pts[i],
                    eta: etas[i],
                    area: areas.as_ref().map_or(0.0, |a| a[i]),
                    rho,
                };
                let mut factor = 1.0;
                for &kind in &levels {
                    factor *= evaluator.evaluate(kind, &input)?;
                }
                if factor <= 0.0 {
                    return Err(Error::Correction(format!(
                        "non-positive correction factor {factor} for jet {i}"
                    )));
                }
                factors.push(factor);
            }
            Ok(ColumnValue::VecF64(factors))
        }
    };

    let mut node = analyzer.define(
        node,
        "Jet_jec",
        Expr::func("jec_factor", &deps, ColumnType::VecF64, Arc::new(func)),
    )?;
    node = analyzer.redefine(node, "Jet_pt", Expr::map("Jet_rawPt * Jet_jec"))?;
    if analyzer.is_defined(node, "Jet_rawFactor") {
        node = analyzer.redefine(node, "Jet_rawFactor", Expr::map("1.0 - 1.0 / Jet_jec"))?;
    }
    Ok(node)
}

fn golden_lumi_filter(
    analyzer: &mut Analyzer,
    node: NodeId,
    mask: Arc<dyn LumiMask>,
) -> Result<NodeId> {
    if !analyzer.is_defined(node, "run") || !analyzer.is_defined(node, "luminosityBlock") {
        tracing::warn!("golden-lumi mask configured but run/luminosityBlock columns absent");
        return Ok(node);
    }
    analyzer.filter(
        node,
        "golden lumi",
        Pred::func(
            "golden_lumi_selected",
            &["run", "luminosityBlock"],
            Arc::new(move |deps, _ctx| {
                let run = deps[0].as_i64()? as u32;
                let lumi = deps[1].as_i64()? as u32;
                Ok(ColumnValue::Bool(mask.is_selected(run, lumi)))
            }),
        ),
    )
}
