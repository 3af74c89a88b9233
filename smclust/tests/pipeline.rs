use nalgebra::DMatrix;
use smcore::algorithm::binning::{bin_collection, feature_matrix, Aggregation};
use smcore::algorithm::fingerprint_distance::FingerprintMetric;
use smcore::algorithm::fingerprint_gen::{compute_fingerprints, FingerprintConfig};
use smcore::algorithm::spectral_distance::SpectralMetric;
use smcore::config::{ProcessingConfig, Workers};
use smcore::data::distance_matrix::DistanceMatrix;
use smcore::data::spectrum::Spectrum;
use smcore::data::structure::StructureString;
use smcore::matrix::builder::build_distance_matrix;
use smcore::matrix::codec::{load_matrix, save_matrix};

use smclust::cluster::adapter::{ClusterInput, ClusteringAdapter, ClusteringStrategy};
use smclust::cluster::density::DensityParams;
use smclust::cluster::hac::HacParams;
use smclust::cluster::kmeans::{select_best_k, KSelectionParams};
use smclust::cluster::partition::{NoisePolicy, Partition};
use smclust::compare::layout::compare;
use smclust::compare::scores::agreement;
use smclust::io::{load_record, save_record, ResultRecord};

fn family(id: &str, base: f64, intensities: [f64; 3]) -> Spectrum {
    Spectrum::new(id, vec![base, base + 50.1, base + 100.2], intensities.to_vec()).unwrap()
}

/// Four spectra around 100 Da, four around 300 Da and one without signal.
fn spectra() -> Vec<Spectrum> {
    vec![
        family("a1", 100.2, [1.0, 0.5, 0.2]),
        family("b1", 300.2, [1.0, 0.3, 0.6]),
        family("a2", 100.2, [0.9, 0.6, 0.2]),
        family("b2", 300.2, [0.8, 0.3, 0.5]),
        family("empty", 250.0, [0.0, 0.0, 0.0]),
        family("a3", 100.2, [1.0, 0.4, 0.3]),
        family("b3", 300.2, [1.0, 0.4, 0.6]),
        family("a4", 100.2, [0.8, 0.5, 0.25]),
        family("b4", 300.2, [0.9, 0.3, 0.7]),
    ]
}

fn expected_families(partition: &Partition) {
    let labels = partition.labels();
    for (first, members) in [(0, [0, 2, 4, 6]), (1, [1, 3, 5, 7])] {
        assert!(members.iter().all(|m| labels[*m] == labels[first]), "labels {:?}", labels);
    }
    assert_ne!(labels[0], labels[1]);
}

fn binned_distances() -> DistanceMatrix {
    let binned = bin_collection(&spectra(), 1.0, Aggregation::Sum, &ProcessingConfig::default(), Workers::Fixed(2))
        .unwrap();
    assert_eq!(binned.discarded, vec!["empty".to_string()]);
    assert_eq!(binned.spectra.len(), 8);

    let distance = SpectralMetric::CosineBinned.resolve().unwrap();
    build_distance_matrix(&binned.spectra, distance, Workers::Fixed(3)).unwrap()
}

#[test]
fn spectra_to_clusters_and_back() {
    let matrix = binned_distances();
    assert_eq!(matrix.get(0, 1), 1.0);
    assert!(matrix.get(0, 2) < 0.05);

    let dir = tempfile::tempdir().unwrap();
    let matrix_path = dir.path().join("matrix_cosine.csv");
    save_matrix(&matrix, &matrix_path).unwrap();
    let matrix = load_matrix(&matrix_path).unwrap();
    assert_eq!(matrix.len(), 8);

    let input = ClusterInput::Distances(&matrix);
    let hac = ClusteringStrategy::Hierarchical(HacParams { k: 2 }).cluster(&input).unwrap();
    expected_families(&hac.partition);
    assert!(hac.performance["silhouette_score"].as_f64().unwrap() > 0.9);

    let density = ClusteringStrategy::Density(DensityParams {
        min_cluster_size: 3,
        min_samples: None,
        noise_policy: NoisePolicy::Explode,
    })
    .cluster(&input)
    .unwrap();
    expected_families(&density.partition);
    assert_eq!(density.performance["noise_count"], 0);

    let record_path = dir.path().join("hac.json");
    save_record(&ResultRecord::from(&hac), &record_path).unwrap();
    let restored = load_record(&record_path).unwrap().to_partition().unwrap();
    assert_eq!(restored, hac.partition);

    let scores = agreement(&restored, &density.partition).unwrap();
    assert_eq!(scores.ari, 1.0);
    assert!((scores.nmi - 1.0).abs() < 1e-12);

    let layout = compare(&restored, &density.partition).unwrap();
    assert_eq!(layout.centroids.len(), 2);
    assert_eq!(layout.points.len(), 8);
}

#[test]
fn k_selection_on_histograms() {
    let raw: Vec<Spectrum> = spectra().into_iter().filter(|s| s.id() != "empty").collect();
    let features = feature_matrix(&raw, 10.0, 20.0, 500.0).unwrap();

    let strategy = ClusteringStrategy::Partitional(KSelectionParams {
        k_min: 1,
        k_max: 1000,
        workers: Workers::Fixed(2),
        ..KSelectionParams::default()
    });
    let outcome = strategy.cluster(&ClusterInput::Features(&features)).unwrap();
    assert_eq!(outcome.parameters["k_min"], 2);
    assert_eq!(outcome.parameters["k_max"], 8);
    assert_eq!(outcome.parameters["best_k"], 2);
    assert_eq!(outcome.performance["scores"].as_object().unwrap().len(), 7);
    expected_families(&outcome.partition);
}

#[test]
fn k_range_is_clamped_to_item_count() {
    let features = DMatrix::from_fn(10, 3, |i, j| ((i * 7 + j * 3) % 5) as f64 + i as f64 * 0.01);
    let params = KSelectionParams { k_min: 1, k_max: 1000, workers: Workers::Sequential, ..KSelectionParams::default() };
    let selection = select_best_k(&features, &params).unwrap();
    assert_eq!((selection.k_min, selection.k_max), (2, 10));
    assert_eq!(selection.scores.len(), 9);
}

#[test]
fn identical_partitions_agree_exactly() {
    let a = Partition::new(vec![0, 0, 0, 1, 1, 1]).unwrap();
    let scores = agreement(&a, &a.clone()).unwrap();
    assert_eq!(scores.ari, 1.0);
    assert_eq!(scores.nmi, 1.0);
}

#[test]
fn structures_to_clusters() {
    let structures: Vec<StructureString> = ["CCO", "c1ccccc1", "CCCO", "Cc1ccccc1", "CCCCO", "CCc1ccccc1"]
        .into_iter()
        .map(StructureString::from)
        .collect();
    let fingerprints = compute_fingerprints(&structures, &FingerprintConfig::default()).unwrap();

    let metric = FingerprintMetric::Jaccard;
    let matrix = build_distance_matrix(
        &fingerprints,
        |a, b| Ok(metric.distance(a, b)?.0),
        Workers::Sequential,
    )
    .unwrap();

    let outcome = HacParams { k: 2 }.cluster(&ClusterInput::Distances(&matrix)).unwrap();
    let labels = outcome.partition.labels();
    assert_eq!(labels[0], labels[2]);
    assert_eq!(labels[0], labels[4]);
    assert_eq!(labels[1], labels[3]);
    assert_eq!(labels[1], labels[5]);
    assert_ne!(labels[0], labels[1]);
}
