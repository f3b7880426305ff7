use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hgbase::container::BlockCodec;
use hgbase::keymap::{deobfuscate, obfuscate, KeyMapping};
use hgbase::{Document, Header};
use serde_json::json;

fn sample_stream() -> Vec<u8> {
    let bases: Vec<_> = (0..2000)
        .map(|i| json!({"NKm": format!("Base {i}"), "[sb": {"Jl?": "ExternalPlanetBase"}, ";4U": [i, i + 1, i + 2]}))
        .collect();
    serde_json::to_vec(&json!({"F2P": 4720, "<h0": {"F?0": bases}})).unwrap()
}

fn mapping() -> KeyMapping {
    [("F2P", "Version"), ("<h0", "PlayerStateData"), ("F?0", "PersistentPlayerBases"),
     ("NKm", "Name"), ("[sb", "BaseType"), ("Jl?", "PersistentBaseTypes"), (";4U", "Objects")]
        .into_iter()
        .collect()
}

fn bench_container(c: &mut Criterion) {
    let stream = sample_stream();
    let codec = BlockCodec::default();
    let raw = codec.encode(Some(&Header::default()), &stream).unwrap();

    c.bench_function("container_encode", |b| {
        b.iter(|| codec.encode(Some(&Header::default()), black_box(&stream)).unwrap())
    });
    c.bench_function("container_decode", |b| b.iter(|| codec.decode(black_box(&raw)).unwrap()));
}

fn bench_key_mapping(c: &mut Criterion) {
    let tree = Document::parse(&sample_stream()).unwrap().tree;
    let m = mapping();

    c.bench_function("deobfuscate_tree", |b| b.iter(|| deobfuscate(black_box(tree.clone()), &m)));
    let plain = deobfuscate(tree, &m).tree;
    c.bench_function("obfuscate_tree", |b| b.iter(|| obfuscate(black_box(plain.clone()), &m)));
}

criterion_group!(benches, bench_container, bench_key_mapping);
criterion_main!(benches);
