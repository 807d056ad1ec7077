//! End-to-end channel selections over small hand-built event tables.

use std::f64::consts::PI;
use std::sync::Arc;

use jc_columnar::{
    ActionKind, ActionSpec, Analyzer, AxisDef, Binning, EventDataset, Pred, RunConfig,
};
use jc_core::{
    CorrectionEvaluator, CorrectionInput, CorrectionKind, CorrectionLevel, CorrectionSet,
    HistResult, LumiMask,
};
use jc_select::{
    BinTable, Channel, DijetSelection, MultijetSelection, PhotonJetSelection, PrepareConfig,
    ZmmSelection, apply, define_responses, prepare, register_responses,
};

/// Three events: a clean back-to-back pair, a zero-jet event, and a
/// non-back-to-back pair.
fn dijet_dataset() -> Arc<EventDataset> {
    Arc::new(
        EventDataset::builder()
            .i64("run", vec![379413, 379413, 379414])
            .i64("luminosityBlock", vec![1, 1, 2])
            .i64("event", vec![11, 12, 13])
            .jagged_f64("Jet_pt", vec![vec![100.0, 95.0], vec![], vec![80.0, 75.0]])
            .jagged_f64("Jet_eta", vec![vec![0.5, -0.3], vec![], vec![0.2, 0.4]])
            .jagged_f64("Jet_phi", vec![vec![0.0, PI], vec![], vec![0.0, 1.0]])
            .jagged_f64("Jet_mass", vec![vec![5.0, 4.0], vec![], vec![3.0, 3.0]])
            .jagged_i64("Jet_jetId", vec![vec![6, 6], vec![], vec![6, 6]])
            .jagged_f64("Jet_rawFactor", vec![vec![0.05, 0.04], vec![], vec![0.0, 0.0]])
            .bool("HLT_PFJet80", vec![true, true, true])
            .build()
            .unwrap(),
    )
}

fn response_axis() -> AxisDef {
    AxisDef::new("response", Binning::Uniform { n: 100, min: 0.0, max: 2.0 })
}

fn run_dijet_pipeline() -> Analyzer {
    let mut analyzer = Analyzer::new(dijet_dataset());
    let prepared = prepare(&mut analyzer, &PrepareConfig::default()).expect("preparation chain");
    analyzer
        .init_branches(
            prepared,
            vec![("HLT_PFJet80".to_string(), Pred::formula("HLT_PFJet80"))],
        )
        .unwrap();

    for branch in ["all", "HLT_PFJet80"] {
        let node = analyzer.branch(branch).unwrap();
        let node = apply(&mut analyzer, node, &DijetSelection::default()).unwrap();
        let node = define_responses(&mut analyzer, node).unwrap();
        register_responses(&mut analyzer, branch, node, Channel::Dijet, &BinTable::default())
            .unwrap();
    }
    analyzer.run(&RunConfig { n_partitions: Some(2) }).unwrap();
    analyzer
}

fn find_result<'a>(analyzer: &'a Analyzer, branch: &str, name: &str) -> &'a HistResult {
    analyzer
        .results()
        .unwrap()
        .find(|(b, r)| *b == branch && r.name == name)
        .map(|(_, r)| r)
        .unwrap_or_else(|| panic!("result {name} on {branch}"))
}

struct DoublingJec;

impl CorrectionEvaluator for DoublingJec {
    fn evaluate(&self, _kind: CorrectionKind, _input: &CorrectionInput) -> jc_core::Result<f64> {
        Ok(2.0)
    }
}

struct GoldenRun(u32);

impl LumiMask for GoldenRun {
    fn is_selected(&self, run: u32, _lumi_block: u32) -> bool {
        run == self.0
    }
}

fn l2relative() -> CorrectionSet {
    CorrectionSet::new(vec![CorrectionLevel {
        kind: CorrectionKind::L2Relative,
        payload: "Summer24_V1_L2Relative".to_string(),
    }])
    .unwrap()
}

#[test]
fn dijet_scenario_takes_one_of_two_assignments() {
    let analyzer = run_dijet_pipeline();
    let response = find_result(&analyzer, "HLT_PFJet80", "DB_dijet_Response");

    // Only the back-to-back event survives; its response is 95/100 or
    // 100/95 depending on the seeded draw.
    assert_eq!(response.entries, 1);
    let filled: Vec<usize> = response
        .contents
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c != 0.0)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(filled.len(), 1);
    // 0.95 lands in bin 47, 1/0.95 in bin 52 of the [0, 2) axis.
    assert!(filled[0] == 47 || filled[0] == 52, "bin {}", filled[0]);
}

#[test]
fn dijet_tag_and_probe_pts_are_the_two_leading_jets() {
    let analyzer = run_dijet_pipeline();
    let tag_pt = find_result(&analyzer, "all", "DB_dijet_PtVsResponse_TagPt");
    let probe_pt = find_result(&analyzer, "all", "DB_dijet_PtVsResponse_ProbePt");
    let avg_pt = find_result(&analyzer, "all", "DB_dijet_PtVsResponse_AveragePt");

    // Whatever the assignment, {tag, probe} = {100, 95}: on the JEC pt axis
    // one lands in [84, 97) and the other in [97, 114), while the 97.5
    // average is always in [97, 114).
    let pt_bin_lo = |r: &HistResult| {
        let n_cols = r.axes[1].n_bins();
        let row = (0..r.axes[0].n_bins())
            .find(|&i| (0..n_cols).any(|j| r.value_at(&[i, j]).unwrap_or(0.0) != 0.0))
            .expect("a filled pt bin");
        r.axes[0].edges[row]
    };
    for r in [tag_pt, probe_pt, avg_pt] {
        assert_eq!(r.entries, 1);
    }
    let mut tag_probe_bins = [pt_bin_lo(tag_pt), pt_bin_lo(probe_pt)];
    tag_probe_bins.sort_by(f64::total_cmp);
    assert_eq!(tag_probe_bins, [84.0, 97.0]);
    assert_eq!(pt_bin_lo(avg_pt), 97.0);
}

#[test]
fn dijet_assignment_is_deterministic_across_runs() {
    let first = run_dijet_pipeline();
    let second = run_dijet_pipeline();
    for name in ["DB_dijet_Response", "Asymmetry_dijet_Response"] {
        let a = find_result(&first, "HLT_PFJet80", name);
        let b = find_result(&second, "HLT_PFJet80", name);
        assert_eq!(a.contents, b.contents, "{name} differs between runs");
    }
}

#[test]
fn zero_jet_event_survives_no_branch_and_nothing_raises() {
    let analyzer = run_dijet_pipeline();
    let cutflows = analyzer.cutflows().unwrap();
    for cutflow in cutflows {
        let labels = cutflow.bin_labels.as_ref().unwrap();
        let found = labels.iter().position(|l| l == "tag and probe found").unwrap();
        // Three events in, only the back-to-back pair has a tag and probe.
        assert_eq!(cutflow.contents[0], 3.0, "{}", cutflow.name);
        assert_eq!(cutflow.contents[found], 1.0, "{}", cutflow.name);
    }
}

#[test]
fn zmm_channel_reconstructs_the_z_tag() {
    let dataset = Arc::new(
        EventDataset::builder()
            .jagged_f64("Muon_pt", vec![vec![60.0, 40.0]])
            .jagged_f64("Muon_eta", vec![vec![0.1, -0.2]])
            .jagged_f64("Muon_phi", vec![vec![0.0, PI]])
            .jagged_f64("Muon_mass", vec![vec![0.105, 0.105]])
            .jagged_f64("Muon_pfRelIso03_all", vec![vec![0.02, 0.05]])
            .jagged_i64("Muon_tightId", vec![vec![1, 1]])
            .jagged_f64("Muon_charge", vec![vec![1.0, -1.0]])
            .jagged_f64("Jet_pt", vec![vec![25.0]])
            .jagged_f64("Jet_eta", vec![vec![0.3]])
            .jagged_f64("Jet_phi", vec![vec![PI]])
            .jagged_f64("Jet_mass", vec![vec![2.0]])
            .jagged_i64("Jet_jetId", vec![vec![6]])
            .bool("HLT_IsoMu24", vec![true])
            .build()
            .unwrap(),
    );
    let mut analyzer = Analyzer::new(dataset);
    let prepared = prepare(&mut analyzer, &PrepareConfig::default()).unwrap();
    analyzer
        .init_branches(prepared, vec![("HLT_IsoMu24".to_string(), Pred::formula("HLT_IsoMu24"))])
        .unwrap();
    let node = analyzer.branch("HLT_IsoMu24").unwrap();
    let node = apply(&mut analyzer, node, &ZmmSelection::default()).unwrap();
    let node = define_responses(&mut analyzer, node).unwrap();
    let tag_mass = analyzer
        .register_at(
            "HLT_IsoMu24",
            node,
            ActionSpec::new(
                "Control_zmm_TagMass",
                ActionKind::Hist1D,
                &["Tag_mass"],
                vec![AxisDef::new("m (GeV)", Binning::Uniform { n: 60, min: 60.0, max: 120.0 })],
            ),
        )
        .unwrap();
    let response = analyzer
        .register_at(
            "HLT_IsoMu24",
            node,
            ActionSpec::new(
                "Control_zmm_Response",
                ActionKind::Hist1D,
                &["DB_ratio"],
                vec![response_axis()],
            ),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();

    // Z from a 60+40 GeV opposite-charge pair: m ~ 98, pt = 20.
    let mass = analyzer.result(tag_mass).unwrap();
    assert_eq!(mass.entries, 1);
    let filled = mass.contents.iter().position(|&c| c != 0.0).unwrap();
    let m_lo = mass.axes[0].edges[filled];
    assert!((m_lo - 98.0).abs() < 2.0, "Z mass bin edge {m_lo}");

    // Probe jet at 25 GeV against the 20 GeV Z.
    let r = analyzer.result(response).unwrap();
    let filled = r.contents.iter().position(|&c| c != 0.0).unwrap();
    let lo = r.axes[0].edges[filled];
    assert!((lo - 1.24).abs() < 0.03, "response bin edge {lo}");
}

#[test]
fn multijet_channel_tags_with_the_recoil_system() {
    let dataset = Arc::new(
        EventDataset::builder()
            .jagged_f64("Jet_pt", vec![vec![100.0, 40.0, 35.0, 32.0]])
            .jagged_f64("Jet_eta", vec![vec![0.0, 0.5, -0.5, 0.8]])
            .jagged_f64("Jet_phi", vec![vec![0.0, PI, 2.5, -2.6]])
            .jagged_f64("Jet_mass", vec![vec![8.0, 4.0, 4.0, 4.0]])
            .jagged_i64("Jet_jetId", vec![vec![6, 6, 6, 6]])
            .bool("HLT_PFJet80", vec![true])
            .build()
            .unwrap(),
    );
    let mut analyzer = Analyzer::new(dataset);
    let prepared = prepare(&mut analyzer, &PrepareConfig::default()).unwrap();
    analyzer
        .init_branches(
            prepared,
            vec![("HLT_PFJet80".to_string(), Pred::formula("HLT_PFJet80"))],
        )
        .unwrap();
    let node = analyzer.branch("HLT_PFJet80").unwrap();
    let node = apply(&mut analyzer, node, &MultijetSelection::default()).unwrap();
    let node = define_responses(&mut analyzer, node).unwrap();
    let probe = analyzer
        .register_at(
            "HLT_PFJet80",
            node,
            ActionSpec::new(
                "Control_multijet_ProbePt",
                ActionKind::Hist1D,
                &["Probe_pt"],
                vec![AxisDef::new("p_T (GeV)", Binning::Uniform { n: 40, min: 0.0, max: 200.0 })],
            ),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();

    let r = analyzer.result(probe).unwrap();
    assert_eq!(r.entries, 1);
    // The probe is the 100 GeV lead jet.
    assert_eq!(r.value_at(&[20]), Some(1.0));
}

#[test]
fn photonjet_channel_balances_jet_against_photon() {
    let dataset = Arc::new(
        EventDataset::builder()
            .jagged_f64("Photon_pt", vec![vec![50.0]])
            .jagged_f64("Photon_eta", vec![vec![0.3]])
            .jagged_f64("Photon_phi", vec![vec![0.0]])
            .jagged_i64("Photon_cutBased", vec![vec![3]])
            .jagged_f64("Photon_hoe", vec![vec![0.01]])
            .jagged_f64("Photon_r9", vec![vec![0.96]])
            .jagged_f64("Jet_pt", vec![vec![40.0]])
            .jagged_f64("Jet_eta", vec![vec![0.5]])
            .jagged_f64("Jet_phi", vec![vec![PI]])
            .jagged_f64("Jet_mass", vec![vec![3.0]])
            .jagged_i64("Jet_jetId", vec![vec![6]])
            .bool("HLT_Photon50", vec![true])
            .build()
            .unwrap(),
    );
    let mut analyzer = Analyzer::new(dataset);
    let prepared = prepare(&mut analyzer, &PrepareConfig::default()).unwrap();
    analyzer
        .init_branches(
            prepared,
            vec![("HLT_Photon50".to_string(), Pred::formula("HLT_Photon50"))],
        )
        .unwrap();
    let node = analyzer.branch("HLT_Photon50").unwrap();
    let node = apply(&mut analyzer, node, &PhotonJetSelection::default()).unwrap();
    let node = define_responses(&mut analyzer, node).unwrap();
    let response = analyzer
        .register_at(
            "HLT_Photon50",
            node,
            ActionSpec::new(
                "Control_photonjet_Response",
                ActionKind::Hist1D,
                &["DB_ratio"],
                vec![response_axis()],
            ),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();

    let r = analyzer.result(response).unwrap();
    assert_eq!(r.entries, 1);
    // 40 GeV jet against a 50 GeV photon: response 0.8, bin 40 of [0, 2).
    assert_eq!(r.value_at(&[40]), Some(1.0));
}

#[test]
fn corrections_rescale_jet_momenta_through_the_evaluator() {
    let dataset = Arc::new(
        EventDataset::builder()
            .jagged_f64("Jet_pt", vec![vec![50.0]])
            .jagged_f64("Jet_eta", vec![vec![0.1]])
            .jagged_f64("Jet_phi", vec![vec![0.0]])
            .jagged_f64("Jet_rawFactor", vec![vec![0.0]])
            .build()
            .unwrap(),
    );
    let mut analyzer = Analyzer::new(dataset);
    let config = PrepareConfig {
        corrections: Some((l2relative(), Arc::new(DoublingJec))),
        ..Default::default()
    };
    let prepared = prepare(&mut analyzer, &config).unwrap();
    analyzer.init_branches(prepared, Vec::new()).unwrap();
    let h = analyzer
        .register(
            "all",
            ActionSpec::new(
                "Control_JetPt",
                ActionKind::Hist1D,
                &["Jet_pt"],
                vec![AxisDef::new("p_T (GeV)", Binning::Uniform { n: 30, min: 0.0, max: 150.0 })],
            ),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();
    let r = analyzer.result(h).unwrap();
    // 50 GeV raw jet doubled to 100 GeV: bin 20 of 5-GeV bins.
    assert_eq!(r.value_at(&[20]), Some(1.0));
}

#[test]
fn golden_lumi_filter_drops_unlisted_runs() {
    let dataset = Arc::new(
        EventDataset::builder()
            .i64("run", vec![379413, 379999])
            .i64("luminosityBlock", vec![1, 1])
            .i64("event", vec![1, 2])
            .jagged_f64("Jet_pt", vec![vec![50.0], vec![60.0]])
            .jagged_f64("Jet_eta", vec![vec![0.1], vec![0.1]])
            .jagged_f64("Jet_phi", vec![vec![0.0], vec![0.0]])
            .build()
            .unwrap(),
    );
    let mut analyzer = Analyzer::new(dataset);
    let config = PrepareConfig {
        lumi_mask: Some(Arc::new(GoldenRun(379413))),
        ..Default::default()
    };
    let prepared = prepare(&mut analyzer, &config).unwrap();
    analyzer.init_branches(prepared, Vec::new()).unwrap();
    let h = analyzer
        .register(
            "all",
            ActionSpec::new(
                "Control_JetPt",
                ActionKind::Hist1D,
                &["Jet_pt"],
                vec![AxisDef::new("p_T (GeV)", Binning::Uniform { n: 30, min: 0.0, max: 150.0 })],
            ),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();
    assert_eq!(analyzer.result(h).unwrap().entries, 1);
    assert_eq!(analyzer.run_range().unwrap(), Some((379413, 379999)));
}
