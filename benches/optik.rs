use criterion::{black_box, criterion_group, criterion_main, Criterion};
use optik::corpus::abi::{encode_args, AbiArg, AbiType};
use optik::types::EVMU256;

fn bench_encode_dynamic_array(c: &mut Criterion) {
    let elems: Vec<AbiArg> =
        (0..32).map(|i| AbiArg::UInt { bits: 256, value: EVMU256::from(i as u64) }).collect();
    let arg = AbiArg::ArrayDynamic { elem_type: AbiType::UInt(256), elems };

    c.bench_function("encode_args/dynamic_array_32", |b| {
        b.iter(|| encode_args(black_box(std::slice::from_ref(&arg))))
    });
}

criterion_group!(benches, bench_encode_dynamic_array);
criterion_main!(benches);
