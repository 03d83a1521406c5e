use conserved_motifs::{
    Alphabet, CompactMotifAggregator, DiscoveryConfig, GeneFamily, GeneRecord,
    GeneralizedSuffixTree, IupacSymbol, MotifEnumerator, MotifSink, PhyloScore, TextCorpus,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

const TREE: &str = "(((S0:0.1,S1:0.1):0.2,(S2:0.15,S3:0.15):0.15):0.1,((S4:0.2,S5:0.2):0.1,(S6:0.05,S7:0.05):0.25):0.1);";
const THRESHOLDS: [f64; 6] = [0.15, 0.5, 0.6, 0.7, 0.9, 0.95];

/// One gene per species, all seeded with a shared motif at random offsets
fn generate_family(gene_len: usize) -> GeneFamily {
    let mut rng = StdRng::seed_from_u64(42);
    let bases = ['A', 'C', 'G', 'T'];
    let planted = "TGACGTCA";

    let genes = (0..8)
        .map(|species| {
            let mut seq: String = (0..gene_len).map(|_| bases[rng.gen_range(0..4)]).collect();
            let at = rng.gen_range(0..gene_len - planted.len());
            seq.replace_range(at..at + planted.len(), planted);
            GeneRecord {
                gene_ids: vec![format!("g{species}")],
                species: format!("S{species}"),
                sequence: seq,
            }
        })
        .collect();

    GeneFamily {
        name: format!("synthetic_{gene_len}"),
        newick: TREE.to_string(),
        genes,
    }
}

fn bench_tree_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_construction");
    let bls = PhyloScore::new(TREE, &THRESHOLDS).unwrap();

    for gene_len in [500, 2000, 8000] {
        let family = generate_family(gene_len);
        let corpus = TextCorpus::build(&family, &bls).unwrap();
        group.bench_with_input(BenchmarkId::new("build", gene_len), &corpus, |b, corpus| {
            b.iter(|| {
                GeneralizedSuffixTree::build(black_box(corpus.text()), corpus.boundaries()).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumeration");
    group.measurement_time(Duration::from_secs(10));
    let bls = PhyloScore::new(TREE, &THRESHOLDS).unwrap();

    for (label, config) in [
        ("exact", DiscoveryConfig::default()),
        (
            "twofold",
            DiscoveryConfig {
                alphabet: Alphabet::ExactTwofoldsAndN,
                max_degenerate: 2,
                max_len: 9,
                ..DiscoveryConfig::default()
            },
        ),
    ] {
        let family = generate_family(1000);
        let corpus = TextCorpus::build(&family, &bls).unwrap();
        let tree = GeneralizedSuffixTree::build(corpus.text(), corpus.boundaries()).unwrap();
        group.bench_function(BenchmarkId::new("enumerate", label), |b| {
            b.iter(|| {
                let mut sink = MotifSink::new(&config, std::io::sink());
                MotifEnumerator::new(&tree, &corpus, &bls, &config)
                    .run(black_box(&mut sink))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let symbols = Alphabet::ExactTwofoldsAndN.symbols();
    let motifs: Vec<Vec<IupacSymbol>> = (0..20_000)
        .map(|_| {
            let len = rng.gen_range(6..13);
            (0..len)
                .map(|_| symbols[rng.gen_range(0..symbols.len())])
                .collect()
        })
        .collect();

    c.bench_function("aggregate_20k", |b| {
        b.iter(|| {
            let mut aggregator = CompactMotifAggregator::new(13, THRESHOLDS.len());
            for motif in &motifs {
                aggregator.add_occurrence(black_box(motif), 3).unwrap();
            }
            aggregator.motif_count()
        });
    });
}

criterion_group!(
    benches,
    bench_tree_construction,
    bench_enumeration,
    bench_aggregation
);
criterion_main!(benches);
