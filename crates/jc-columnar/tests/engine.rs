//! End-to-end engine properties: shared-subgraph evaluation, lazy actions,
//! idempotent runs, and order-independent merging.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jc_columnar::{
    ActionKind, ActionSpec, Analyzer, AxisDef, Binning, ColumnType, ColumnValue, EventDataset,
    Expr, Pred, RunConfig,
};
use jc_core::Error;

fn dijet_like_dataset() -> Arc<EventDataset> {
    Arc::new(
        EventDataset::builder()
            .i64("run", vec![379413, 379413, 379414, 379415])
            .i64("luminosityBlock", vec![10, 11, 3, 9])
            .i64("event", vec![1001, 1002, 2001, 3001])
            .jagged_f64(
                "Jet_pt",
                vec![
                    vec![100.0, 95.0, 20.0],
                    vec![60.0, 55.0],
                    vec![],
                    vec![250.0, 240.0, 30.0, 25.0],
                ],
            )
            .bool("HLT_PFJet80", vec![true, false, true, true])
            .f64("weight", vec![1.0, 0.5, 1.0, 2.0])
            .build()
            .unwrap(),
    )
}

fn pt_axis() -> AxisDef {
    AxisDef::new("p_T (GeV)", Binning::Uniform { n: 30, min: 0.0, max: 300.0 })
}

fn build_analyzer(dataset: Arc<EventDataset>) -> Analyzer {
    let mut analyzer = Analyzer::new(dataset);
    let root = analyzer.root();
    let n = analyzer.define(root, "nJet", Expr::length("Jet_pt")).unwrap();
    let prepared = analyzer
        .filter(n, "at least one jet", Pred::formula("nJet >= 1"))
        .unwrap();
    analyzer
        .init_branches(
            prepared,
            vec![("HLT_PFJet80".to_string(), Pred::formula("HLT_PFJet80"))],
        )
        .unwrap();
    analyzer
}

#[test]
fn jagged_input_fills_once_per_element_with_event_weight() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    let h = analyzer
        .register(
            "HLT_PFJet80",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();

    let r = analyzer.result(h).unwrap();
    // Event 0: three jets at weight 1, event 3: four jets at weight 2.
    // Events 1 (trigger fail) and 2 (zero jets) contribute nothing.
    assert_eq!(r.entries, 3 + 4);
    let total: f64 = r.contents.iter().sum::<f64>() + r.underflow + r.overflow;
    assert_eq!(total, 3.0 * 1.0 + 4.0 * 2.0);
}

#[test]
fn zero_jet_events_drop_without_raising() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    let node = analyzer.branch("HLT_PFJet80").unwrap();
    let lead = analyzer.define(node, "lead_pt", Expr::element("Jet_pt", 0)).unwrap();
    let h = analyzer
        .register_at(
            "HLT_PFJet80",
            lead,
            ActionSpec::new("Control_LeadPt", ActionKind::Hist1D, &["lead_pt"], vec![pt_axis()]),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();
    // The zero-jet event was filtered upstream; nothing raised, two fills.
    assert_eq!(analyzer.result(h).unwrap().entries, 2);
}

#[test]
fn run_is_idempotent() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    let h = analyzer
        .register(
            "HLT_PFJet80",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();
    let first = analyzer.result(h).unwrap().clone();
    analyzer.run(&RunConfig::default()).unwrap();
    let second = analyzer.result(h).unwrap();
    assert_eq!(&first, second);
}

#[test]
fn merge_is_partition_count_independent() {
    let make = |partitions: Option<usize>| {
        let mut analyzer = build_analyzer(dijet_like_dataset());
        let h = analyzer
            .register(
                "all",
                ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
            )
            .unwrap();
        analyzer.run(&RunConfig { n_partitions: partitions }).unwrap();
        analyzer.result(h).unwrap().clone()
    };
    let single = make(Some(1));
    let many = make(Some(7));
    assert_eq!(single.contents, many.contents);
    assert_eq!(single.errors, many.errors);
    assert_eq!(single.entries, many.entries);
}

#[test]
fn shared_define_computed_once_per_event_across_branch_actions() {
    let dataset = dijet_like_dataset();
    let mut analyzer = Analyzer::new(Arc::clone(&dataset));
    let root = analyzer.root();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let shared = analyzer
        .define(
            root,
            "lead_pt",
            Expr::func(
                "counted_lead_pt",
                &["Jet_pt"],
                ColumnType::F64,
                Arc::new(move |deps, _ctx| {
                    calls_in.fetch_add(1, Ordering::SeqCst);
                    Ok(ColumnValue::F64(deps[0].element_f64(0).unwrap_or(0.0)))
                }),
            ),
        )
        .unwrap();
    analyzer
        .init_branches(
            shared,
            vec![
                ("HLT_PFJet80".to_string(), Pred::formula("HLT_PFJet80")),
                ("lead_above_50".to_string(), Pred::formula("lead_pt > 50")),
            ],
        )
        .unwrap();
    let axis = pt_axis();
    let h1 = analyzer
        .register(
            "HLT_PFJet80",
            ActionSpec::new("Control_A", ActionKind::Hist1D, &["lead_pt"], vec![axis.clone()]),
        )
        .unwrap();
    let h2 = analyzer
        .register(
            "lead_above_50",
            ActionSpec::new("Control_B", ActionKind::Hist1D, &["lead_pt"], vec![axis]),
        )
        .unwrap();
    analyzer.run(&RunConfig { n_partitions: Some(1) }).unwrap();

    // One evaluation per event despite two branches and two actions.
    assert_eq!(calls.load(Ordering::SeqCst), dataset.n_events());
    assert!(analyzer.result(h1).is_ok());
    assert!(analyzer.result(h2).is_ok());
}

#[test]
fn handle_before_run_is_not_yet_computed() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    let h = analyzer
        .register(
            "all",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    assert!(matches!(analyzer.result(h), Err(Error::NotYetComputed(_))));
    assert!(matches!(analyzer.cutflows(), Err(Error::NotYetComputed(_))));
}

#[test]
fn graph_frozen_after_first_run() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    analyzer
        .register(
            "all",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();

    let root = analyzer.root();
    assert!(matches!(
        analyzer.define(root, "late", Expr::formula("weight")),
        Err(Error::GraphFrozen(_))
    ));
    assert!(matches!(
        analyzer.add_branch("late", Pred::formula("HLT_PFJet80")),
        Err(Error::GraphFrozen(_))
    ));
    assert!(matches!(
        analyzer.register(
            "all",
            ActionSpec::new("Late_Hist", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        ),
        Err(Error::GraphFrozen(_))
    ));
}

#[test]
fn worker_error_aborts_whole_run_without_partial_results() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    let node = analyzer.branch("all").unwrap();
    let bad = analyzer
        .define(
            node,
            "always_fails",
            Expr::func(
                "always_fails",
                &[],
                ColumnType::F64,
                Arc::new(|_deps, _ctx| {
                    Err(Error::DivisionDomain("Tag_pt == 0".to_string()))
                }),
            ),
        )
        .unwrap();
    let good = analyzer
        .register(
            "all",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    analyzer
        .register_at(
            "all",
            bad,
            ActionSpec::new("Bad_Hist", ActionKind::Hist1D, &["always_fails"], vec![pt_axis()]),
        )
        .unwrap();

    let err = analyzer.run(&RunConfig::default()).unwrap_err();
    assert!(matches!(err, Error::SchedulerFatal(_)));
    // No partial results surfaced, not even for the healthy action.
    assert!(matches!(analyzer.result(good), Err(Error::NotYetComputed(_))));
}

#[test]
fn run_range_is_a_global_reduction() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    analyzer
        .register(
            "all",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    // Many partitions: min/max must still span all of them.
    analyzer.run(&RunConfig { n_partitions: Some(4) }).unwrap();
    assert_eq!(analyzer.run_range().unwrap(), Some((379413, 379415)));
    assert_eq!(analyzer.events_processed().unwrap(), 4);
}

#[test]
fn cutflow_reports_counts_per_filter_stage() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    analyzer
        .register(
            "HLT_PFJet80",
            ActionSpec::new("Inclusive_JetPt", ActionKind::Hist1D, &["Jet_pt"], vec![pt_axis()]),
        )
        .unwrap();
    analyzer.run(&RunConfig { n_partitions: Some(2) }).unwrap();

    let cutflows = analyzer.cutflows().unwrap();
    let trigger = cutflows
        .iter()
        .find(|c| c.name == "Cutflow_HLT_PFJet80")
        .expect("trigger branch cutflow");
    let labels = trigger.bin_labels.as_ref().unwrap();
    assert_eq!(labels[0], "events");
    assert_eq!(labels[1], "at least one jet");
    assert_eq!(labels[2], "HLT_PFJet80");
    // 4 events in, 3 with a jet, 2 of those firing the trigger.
    assert_eq!(trigger.contents, vec![4.0, 3.0, 2.0]);
}

#[test]
fn profile_action_over_shared_branch() {
    let mut analyzer = build_analyzer(dijet_like_dataset());
    let node = analyzer.branch("all").unwrap();
    let lead = analyzer.define(node, "lead_pt", Expr::element("Jet_pt", 0)).unwrap();
    let n = analyzer.define(lead, "njet_f", Expr::formula("nJet")).unwrap();
    let p = analyzer
        .register_at(
            "all",
            n,
            ActionSpec::new(
                "Control_NJetVsLeadPt",
                ActionKind::Profile1D,
                &["njet_f", "lead_pt"],
                vec![AxisDef::new("nJet", Binning::Uniform { n: 10, min: 0.0, max: 10.0 })],
            ),
        )
        .unwrap();
    analyzer.run(&RunConfig::default()).unwrap();
    let r = analyzer.result(p).unwrap();
    // Bin for nJet = 2 holds the lone two-jet event's lead pt.
    assert_eq!(r.value_at(&[2]), Some(60.0));
    // Bin for nJet = 3 holds the 100 GeV event.
    assert_eq!(r.value_at(&[3]), Some(100.0));
}
