use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nib_engine::nib_sdk::{
    create_native, Environment, EnvironmentExt, FunctionMap, NativeArg,
};
use nib_engine::{Vm, VmValue};

fn bench_library(map: &mut dyn FunctionMap) {
    map.insert(
        "add",
        create_native(2, |env, args| {
            let a = args[0].as_int().unwrap_or(0);
            let b = args[1].as_int().unwrap_or(0);
            env.new_int(a.wrapping_add(b))
        }),
    );
}

fn bench_native_call(c: &mut Criterion) {
    let vm = Vm::new();
    let module = vm.load_library("bench", &bench_library).unwrap();
    let add = vm.get_function("bench", "add").unwrap();
    let env = vm.module_environment(module).unwrap();

    let mut group = c.benchmark_group("native_call");
    group.bench_function("array", |b| {
        let args = [NativeArg::Int(1), NativeArg::Int(2)];
        b.iter(|| env.call_int_function_a(black_box(add), &args).unwrap());
    });
    group.bench_function("positional", |b| {
        b.iter(|| env.call_int_function(black_box(add), (1i32, 2i32)).unwrap());
    });
    group.bench_function("invoke", |b| {
        let args = [VmValue::Int(1), VmValue::Int(2)];
        b.iter(|| vm.invoke(black_box(add), &args).unwrap());
    });
    group.finish();
}

fn bench_script_call(c: &mut Criterion) {
    let vm = Vm::new();
    let module = vm.define_module("bench").unwrap();
    let f = vm
        .define_script_function(module, "id", 1, |args| Ok(args.first().cloned()))
        .unwrap();
    let env = vm.module_environment(module).unwrap();

    c.bench_function("script_call_int", |b| {
        b.iter(|| env.call_int_function(black_box(f), (7i32,)).unwrap());
    });
}

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap");

    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("alloc_free", size), &size, |b, &size| {
            let vm = Vm::new();
            let module = vm.define_module("bench").unwrap();
            let env = vm.module_environment(module).unwrap();
            b.iter(|| {
                let block = env.alloc(black_box(size)).unwrap();
                env.free(block);
            });
        });
    }

    let vm = Vm::new();
    let module = vm.define_module("bench").unwrap();
    let env = vm.module_environment(module).unwrap();
    let block = env.alloc(1).unwrap();
    let value = env.new_int(42);
    group.bench_function("write_read", |b| {
        b.iter(|| {
            env.write(block, 0, value).unwrap();
            let read = env.read(block, 0).unwrap();
            vm.release(read)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_native_call, bench_script_call, bench_heap);
criterion_main!(benches);
