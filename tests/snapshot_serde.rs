use cart_decomp::io::{SubDomainRecord, VtkReader};
use cart_decomp::prelude::*;

#[test]
fn config_loads_from_json() {
    let json = r#"{
        "domain": { "lo": [0.0, 0.0, 0.0], "hi": [10.0, 10.0, 10.0] },
        "resolution": [8, 8, 8],
        "boundary": ["Periodic", "NonPeriodic", "NonPeriodic"],
        "ghost_width": [0.5, 0.5, 0.5],
        "strategy": "Hilbert",
        "imbalance_tolerance": 0.05,
        "itr": 1000.0,
        "refine_passes": 4
    }"#;
    let cfg: DecompositionConfig<3> = serde_json::from_str(json).unwrap();
    assert_eq!(cfg.resolution, [8, 8, 8]);
    assert_eq!(cfg.strategy, StrategyKind::Hilbert);
    assert_eq!(cfg.boundary[0], Boundary::Periodic);
    assert_eq!(cfg.n_parts, None);
    assert_eq!(cfg.seed, None);
    assert!(cfg.validate().is_ok());

    let back: DecompositionConfig<3> =
        serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn wrong_array_length_is_rejected() {
    let json = r#"{
        "domain": { "lo": [0.0, 0.0], "hi": [1.0, 1.0] },
        "resolution": [4, 4, 4],
        "boundary": ["NonPeriodic", "NonPeriodic"],
        "ghost_width": [0.1, 0.1],
        "imbalance_tolerance": 0.05,
        "itr": 1000.0,
        "refine_passes": 4
    }"#;
    assert!(serde_json::from_str::<DecompositionConfig<2>>(json).is_err());
}

#[test]
fn records_and_layouts_survive_json() {
    let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [3, 2])
        .with_boundary([Boundary::Periodic, Boundary::NonPeriodic])
        .with_ghost_width([0.1, 0.1])
        .on_test();
    let mut dec = CartDecomposition::new(cfg, NoComm).unwrap();
    dec.distribute().unwrap();
    dec.build_ghosts().unwrap();

    let records = dec.records().unwrap();
    let text = serde_json::to_string(&records).unwrap();
    let back: Vec<SubDomainRecord<2>> = serde_json::from_str(&text).unwrap();
    assert_eq!(back, records);
    assert_eq!(back[4].id, 4);

    let layout = dec.ghost_layout().unwrap();
    assert!(!layout.external.is_empty());
    let text = serde_json::to_string(&*layout).unwrap();
    let back: GhostLayout<2> = serde_json::from_str(&text).unwrap();
    assert_eq!(&back, &*layout);
}

#[test]
fn vtk_file_per_rank() {
    let cfg = DecompositionConfig::new(Aabb::new([0.0; 3], [1.0; 3]), [2, 2, 2]).on_test();
    let mut dec = CartDecomposition::new(cfg, NoComm).unwrap();
    dec.set_computation_cost(5, 3.0).unwrap();
    dec.distribute().unwrap();

    let dir = std::env::temp_dir().join(format!("cart_decomp_vtk_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dec.write_vtk(&dir, "decomp").unwrap();
    assert!(path.ends_with("decomp_0.vtk"));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("# vtk DataFile Version 3.0"));
    assert!(text.contains("CELL_TYPES 8"));
    let data = VtkReader::read_cell_data(text.as_bytes()).unwrap();
    assert_eq!(data["id"], (0..8).map(|i| i as f64).collect::<Vec<_>>());
    assert_eq!(data["owner"], vec![0.0; 8]);
    assert_eq!(data["computation"][5], 3.0);
    std::fs::remove_dir_all(&dir).unwrap();
}
