use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use lualink::{
    call_function, fetch_property, initialize, push_property, ArrayValue, FunctionDef,
    NativeEntry, NativeFn, NativeValue, Property, PropertyFlags, PropertyType, PushOpts, Runtime,
    ScriptValue,
};

fn bench_scalar_round_trip(c: &mut Criterion) {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new("n", PropertyType::Int32);

    c.bench_function("scalar_push_fetch", |b| {
        b.iter(|| {
            push_property(&registry, &mut rt, &prop, &NativeValue::Int(42), PushOpts::default());
            let mut cell = NativeValue::Zeroed;
            fetch_property(&registry, &mut rt, &prop, &mut cell, -1);
            rt.stack.pop(1);
            black_box(cell)
        })
    });
}

fn bench_array_round_trip(c: &mut Criterion) {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new(
        "xs",
        PropertyType::Array {
            element: Box::new(Property::new("element", PropertyType::Int32)),
        },
    );
    let source = NativeValue::Array(ArrayValue::from(
        (0..64i64).map(NativeValue::Int).collect::<Vec<_>>(),
    ));

    c.bench_function("array64_push_fetch", |b| {
        b.iter(|| {
            push_property(&registry, &mut rt, &prop, &source, PushOpts::default());
            let mut cell = NativeValue::Zeroed;
            fetch_property(&registry, &mut rt, &prop, &mut cell, -1);
            rt.stack.pop(1);
            black_box(cell)
        })
    });
}

fn bench_call(c: &mut Criterion) {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let body = NativeFn::named("add", |args: &mut lualink::CallArgs<'_>| {
        let a = args.cells[1].as_int().unwrap_or(0);
        let b = args.cells[2].as_int().unwrap_or(0);
        args.cells[0] = NativeValue::Int(a + b);
        Ok(())
    });
    let func = FunctionDef::new(
        "Add",
        vec![
            Property::new("ret", PropertyType::Int32)
                .with_flags(PropertyFlags::PARM | PropertyFlags::RETURN_PARM),
            Property::new("a", PropertyType::Int32).with_flags(PropertyFlags::PARM),
            Property::new("b", PropertyType::Int32).with_flags(PropertyFlags::PARM),
        ],
        NativeEntry::Internal,
    )
    .with_default_impl(body);

    c.bench_function("call_two_ints", |b| {
        b.iter(|| {
            rt.stack.push(ScriptValue::Integer(30));
            rt.stack.push(ScriptValue::Integer(12));
            let pushed = call_function(&registry, &mut rt, &func, None, 1, false);
            rt.stack.pop(pushed + 2);
            black_box(pushed)
        })
    });
}

criterion_group!(
    benches,
    bench_scalar_round_trip,
    bench_array_round_trip,
    bench_call
);
criterion_main!(benches);
