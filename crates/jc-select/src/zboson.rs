//! Z+jet channels: a leptonically-decaying Z boson tags the leading
//! balancing jet. The di-muon and di-electron variants share the jet side
//! and differ only in how the lepton pair is built.

use std::sync::Arc;

use jc_columnar::{Analyzer, ColumnType, ColumnValue, Expr, NodeId, Pred};
use jc_core::{FourVec, Result, delta_phi};

use crate::strategy::{Channel, SelectionStrategy, mirror_probe_columns};

/// Z-boson selection cuts shared by both lepton flavors.
#[derive(Debug, Clone)]
pub struct ZBosonConfig {
    /// Leading lepton pt threshold.
    pub lead_lepton_pt: f64,
    /// Subleading lepton pt threshold.
    pub sub_lepton_pt: f64,
    /// Lepton acceptance: |eta| below this.
    pub lepton_eta_max: f64,
    /// Maximum relative isolation.
    pub iso_max: f64,
    /// Minimum Z pt.
    pub z_min_pt: f64,
    /// Z mass window.
    pub z_mass_window: (f64, f64),
    /// Minimum probe-jet pt.
    pub jet_min_pt: f64,
    /// Minimum jet-id.
    pub min_jet_id: i64,
    /// Minimum |delta phi| between probe and Z.
    pub back_to_back_dphi: f64,
}

impl Default for ZBosonConfig {
    fn default() -> Self {
        Self {
            lead_lepton_pt: 20.0,
            sub_lepton_pt: 10.0,
            lepton_eta_max: 2.4,
            iso_max: 0.15,
            z_min_pt: 12.0,
            z_mass_window: (71.1876, 111.1876),
            jet_min_pt: 12.0,
            min_jet_id: 4,
            back_to_back_dphi: 2.7,
        }
    }
}

/// Z → μμ selection.
#[derive(Debug, Clone, Default)]
pub struct ZmmSelection {
    /// Cut configuration.
    pub config: ZBosonConfig,
}

/// Z → ee selection.
#[derive(Debug, Clone, Default)]
pub struct ZeeSelection {
    /// Cut configuration.
    pub config: ZBosonConfig,
}

impl SelectionStrategy for ZmmSelection {
    fn channel(&self) -> Channel {
        Channel::Zmm
    }

    fn attach(&self, analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId> {
        let cfg = self.config.clone();
        let mut node = analyzer.define(node, "nMuon", Expr::length("Muon_pt"))?;
        node = analyzer.filter(node, "two or more muons", Pred::formula("nMuon > 1"))?;

        // First tight, isolated muon above the leading threshold plus the
        // first opposite-charge partner above the subleading one.
        let pair_cfg = cfg.clone();
        node = analyzer.define(
            node,
            "Lepton_pair",
            Expr::func(
                "zmm_muon_pair",
                &["Muon_eta", "Muon_pt", "Muon_pfRelIso03_all", "Muon_tightId", "Muon_charge"],
                ColumnType::VecI64,
                Arc::new(move |deps, _ctx| {
                    let etas = deps[0].f64_seq()?;
                    let pts = deps[1].f64_seq()?;
                    let isos = deps[2].f64_seq()?;
                    let tight = deps[3].f64_seq()?;
                    let charges = deps[4].f64_seq()?;
                    let mut lead = -1i64;
                    let mut sub = -1i64;
                    for i in 0..pts.len() {
                        if etas[i].abs() >= pair_cfg.lepton_eta_max
                            || isos[i] >= pair_cfg.iso_max
                            || tight[i] <= 0.0
                        {
                            continue;
                        }
                        if lead < 0 && pts[i] > pair_cfg.lead_lepton_pt {
                            lead = i as i64;
                        } else if lead >= 0
                            && sub < 0
                            && charges[i] != charges[lead as usize]
                            && pts[i] > pair_cfg.sub_lepton_pt
                        {
                            sub = i as i64;
                            break;
                        }
                    }
                    Ok(ColumnValue::VecI64(vec![lead, sub]))
                }),
            ),
        )?;
        attach_z_and_jet(analyzer, node, &cfg, Channel::Zmm, "Muon")
    }
}

impl SelectionStrategy for ZeeSelection {
    fn channel(&self) -> Channel {
        Channel::Zee
    }

    fn attach(&self, analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId> {
        let cfg = self.config.clone();
        let mut node = analyzer.define(node, "nElectron", Expr::length("Electron_pt"))?;
        node = analyzer.filter(node, "two or more electrons", Pred::formula("nElectron > 1"))?;

        // Opposite-charge pair with invariant mass closest to the Z,
        // ordered by pt.
        let pair_cfg = cfg.clone();
        node = analyzer.define(
            node,
            "Lepton_pair",
            Expr::func(
                "zee_electron_pair",
                &[
                    "Electron_pt",
                    "Electron_eta",
                    "Electron_phi",
                    "Electron_mass",
                    "Electron_charge",
                ],
                ColumnType::VecI64,
                Arc::new(move |deps, _ctx| {
                    const Z_MASS: f64 = 91.1876;
                    let pts = deps[0].f64_seq()?;
                    let etas = deps[1].f64_seq()?;
                    let phis = deps[2].f64_seq()?;
                    let masses = deps[3].f64_seq()?;
                    let charges = deps[4].f64_seq()?;
                    let mut best: Option<(usize, usize, f64)> = None;
                    for i in 0..pts.len() {
                        if pts[i] <= pair_cfg.sub_lepton_pt
                            || etas[i].abs() >= pair_cfg.lepton_eta_max
                        {
                            continue;
                        }
                        let v1 = FourVec::from_ptetaphim(pts[i], etas[i], phis[i], masses[i]);
                        for j in i + 1..pts.len() {
                            if charges[i] == charges[j]
                                || pts[j] <= pair_cfg.sub_lepton_pt
                                || etas[j].abs() >= pair_cfg.lepton_eta_max
                            {
                                continue;
                            }
                            let v2 =
                                FourVec::from_ptetaphim(pts[j], etas[j], phis[j], masses[j]);
                            let dm = ((v1 + v2).mass() - Z_MASS).abs();
                            if best.is_none_or(|(_, _, b)| dm < b) {
                                best = Some((i, j, dm));
                            }
                        }
                    }
                    let (lead, sub) = match best {
                        Some((i, j, _)) => {
                            if pts[i] >= pts[j] {
                                (i as i64, j as i64)
                            } else {
                                (j as i64, i as i64)
                            }
                        }
                        None => (-1, -1),
                    };
                    Ok(ColumnValue::VecI64(vec![lead, sub]))
                }),
            ),
        )?;
        attach_z_and_jet(analyzer, node, &cfg, Channel::Zee, "Electron")
    }
}

/// Shared Z reconstruction and jet side: Z four-vector tag, mass window,
/// probe jet back-to-back with the Z, activity jet.
fn attach_z_and_jet(
    analyzer: &mut Analyzer,
    node: NodeId,
    cfg: &ZBosonConfig,
    channel: Channel,
    lepton: &str,
) -> Result<NodeId> {
    let mut node = analyzer.define(node, "Lepton_lead_idx", Expr::element("Lepton_pair", 0))?;
    node = analyzer.define(node, "Lepton_sub_idx", Expr::element("Lepton_pair", 1))?;
    node = analyzer.filter(
        node,
        "opposite-charge lepton pair found",
        Pred::formula("Lepton_lead_idx >= 0 && Lepton_sub_idx >= 0"),
    )?;
    node = analyzer.define(
        node,
        "Lepton_lead_pt",
        Expr::element_at(&format!("{lepton}_pt"), "Lepton_lead_idx"),
    )?;
    node = analyzer.filter(
        node,
        "leading lepton above threshold",
        Pred::formula(&format!("Lepton_lead_pt > {}", cfg.lead_lepton_pt)),
    )?;

    let lepton_cols = [
        format!("{lepton}_pt"),
        format!("{lepton}_eta"),
        format!("{lepton}_phi"),
        format!("{lepton}_mass"),
        "Lepton_pair".to_string(),
    ];
    let lepton_deps: Vec<&str> = lepton_cols.iter().map(String::as_str).collect();
    node = analyzer.define(
        node,
        "Z_fourvec",
        Expr::func(
            "z_fourvec_sum",
            &lepton_deps,
            ColumnType::VecF64,
            Arc::new(|deps, _ctx| {
                let pts = deps[0].f64_seq()?;
                let etas = deps[1].f64_seq()?;
                let phis = deps[2].f64_seq()?;
                let masses = deps[3].f64_seq()?;
                let pair = deps[4].f64_seq()?;
                let z: FourVec = pair
                    .iter()
                    .map(|&i| {
                        let i = i as usize;
                        FourVec::from_ptetaphim(pts[i], etas[i], phis[i], masses[i])
                    })
                    .sum();
                Ok(ColumnValue::VecF64(vec![z.pt(), z.eta(), z.phi(), z.mass()]))
            }),
        ),
    )?;
    node = analyzer.define(node, "Tag_pt", Expr::element("Z_fourvec", 0))?;
    node = analyzer.define(node, "Tag_eta", Expr::element("Z_fourvec", 1))?;
    node = analyzer.define(node, "Tag_phi", Expr::element("Z_fourvec", 2))?;
    node = analyzer.define(node, "Tag_mass", Expr::element("Z_fourvec", 3))?;
    node = analyzer.define(node, "Tag_rawPt", Expr::formula("Tag_pt"))?;
    node = analyzer.define(
        node,
        "Tag_label",
        Expr::constant(ColumnValue::I64(channel.tag_label())),
    )?;

    node = analyzer.filter(
        node,
        "z above minimum pt",
        Pred::formula(&format!("Tag_pt > {}", cfg.z_min_pt)),
    )?;
    let (lo, hi) = cfg.z_mass_window;
    node = analyzer.filter(
        node,
        "z mass window",
        Pred::formula(&format!("Tag_mass > {lo} && Tag_mass < {hi}")),
    )?;

    // Probe: leading jet back-to-back with the Z; activity: next jet.
    let jet_cfg = cfg.clone();
    node = analyzer.define(
        node,
        "ZJet_idx",
        Expr::func(
            "zjet_jet_idxs",
            &["Jet_eta", "Jet_pt", "Jet_phi", "Jet_jetId", "Tag_phi"],
            ColumnType::VecI64,
            Arc::new(move |deps, _ctx| {
                let pts = deps[1].f64_seq()?;
                let phis = deps[2].f64_seq()?;
                let ids = deps[3].f64_seq()?;
                let z_phi = deps[4].as_f64()?;
                let mut probe = -1i64;
                for i in 0..pts.len() {
                    if pts[i] > jet_cfg.jet_min_pt
                        && ids[i] >= jet_cfg.min_jet_id as f64
                        && delta_phi(phis[i], z_phi).abs() > jet_cfg.back_to_back_dphi
                    {
                        probe = i as i64;
                        break;
                    }
                }
                let activity = (0..pts.len())
                    .find(|&i| {
                        i as i64 != probe
                            && pts[i] > jet_cfg.jet_min_pt
                            && ids[i] >= jet_cfg.min_jet_id as f64
                    })
                    .map_or(-1, |i| i as i64);
                Ok(ColumnValue::VecI64(vec![probe, activity]))
            }),
        ),
    )?;
    node = analyzer.define(node, "Probe_idx", Expr::element("ZJet_idx", 0))?;
    node = analyzer.define(node, "Activity_idx", Expr::element("ZJet_idx", 1))?;
    node = analyzer.filter(node, "probe jet found", Pred::formula("Probe_idx >= 0"))?;
    node = analyzer.define(node, "Probe_isFirst", Expr::formula("Probe_idx == 0"))?;

    mirror_probe_columns(analyzer, node)
}
