//! End-to-end marshalling tests: scalars, containers, aggregates, delegates,
//! and full call frames, driven through a registry built by `initialize()`.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use lualink::{
    call_function, codecs, fetch_property, fire_delegate, initialize, process_event,
    push_property, ArrayValue, ClassDef, ClassRef, CodecRegistry, FetchPolicy, FunctionDef,
    FunctionFlags, Name, NativeEntry, NativeFn, NativeValue, ObjectHandle, Property,
    PropertyFlags, PropertyType, PushOpts, Runtime, ScriptKey, ScriptValue, StructDef,
    StructValue,
};

fn int_prop(name: &str) -> Property {
    Property::new(name, PropertyType::Int32)
}

fn array_prop(name: &str) -> Property {
    Property::new(
        name,
        PropertyType::Array {
            element: Box::new(int_prop("element")),
        },
    )
}

fn push_one(registry: &CodecRegistry, rt: &mut Runtime, prop: &Property, cell: &NativeValue) {
    let pushed = push_property(registry, rt, prop, cell, PushOpts::default());
    assert_eq!(pushed, 1);
}

// ======================================================================
// Scalars
// ======================================================================

#[test]
fn scalar_round_trips() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    let cases: Vec<(Property, NativeValue)> = vec![
        (int_prop("i"), NativeValue::Int(-123)),
        (
            Property::new("u", PropertyType::UInt64),
            NativeValue::Int(i64::MAX),
        ),
        (
            Property::new("d", PropertyType::Double),
            NativeValue::Number(3.25),
        ),
        (
            Property::new("b", PropertyType::Bool),
            NativeValue::Bool(true),
        ),
        (
            Property::new("s", PropertyType::Str),
            NativeValue::Str("hello".into()),
        ),
        (
            Property::new("t", PropertyType::Text),
            NativeValue::Text("localized".into()),
        ),
        (
            Property::new("n", PropertyType::Name),
            NativeValue::Name(Name::from("BoneSocket")),
        ),
    ];

    for (prop, value) in cases {
        push_one(&registry, &mut rt, &prop, &value);
        let depth = rt.stack.top();
        let mut fetched = NativeValue::Zeroed;
        assert!(fetch_property(&registry, &mut rt, &prop, &mut fetched, -1));
        // fetch reads, never pops
        assert_eq!(rt.stack.top(), depth);
        assert_eq!(fetched, value, "round trip for {}", prop.name);
        rt.stack.pop(1);
    }
    assert_eq!(rt.stack.top(), 0);
}

#[test]
fn narrow_int_fetch_wraps_to_width() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    rt.stack.push(ScriptValue::Integer(300));
    let prop = Property::new("byte", PropertyType::UInt8);
    let mut cell = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Int(44));
}

#[test]
fn float_fetch_rounds_through_f32() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    rt.stack.push(ScriptValue::Number(1.1));
    let prop = Property::new("f", PropertyType::Float);
    let mut cell = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Number(1.1f32 as f64));
}

#[test]
fn permissive_fetch_coerces_and_zero_fills() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    // numeric string parses
    rt.stack.push(ScriptValue::Str("42".into()));
    let prop = int_prop("n");
    let mut cell = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Int(42));

    // a table is not a number; permissive yields zero, not failure
    rt.stack.push_new_table();
    let mut cell = NativeValue::Int(99);
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Int(0));
}

#[test]
fn strict_fetch_rejects_shape_mismatch() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::with_policy(FetchPolicy::Strict);

    rt.stack.push_new_table();
    let mut cell = NativeValue::Int(7);
    assert!(!fetch_property(
        &registry,
        &mut rt,
        &int_prop("n"),
        &mut cell,
        -1
    ));
    // failed fetch leaves the cell untouched
    assert_eq!(cell, NativeValue::Int(7));
}

// ======================================================================
// Registry degradation
// ======================================================================

#[test]
fn unknown_kind_degrades_to_nil_and_false() {
    // a registry with only scalar codecs: array has no codec
    let mut registry = CodecRegistry::new();
    codecs::scalar::install(&mut registry).unwrap();
    let mut rt = Runtime::new();

    let prop = array_prop("xs");
    let cell = NativeValue::Array(ArrayValue::from(vec![NativeValue::Int(1)]));
    let pushed = push_property(&registry, &mut rt, &prop, &cell, PushOpts::default());
    assert_eq!(pushed, 1);
    assert_eq!(rt.stack.value_at(-1).unwrap(), &ScriptValue::Nil);

    let mut fetched = NativeValue::Zeroed;
    assert!(!fetch_property(&registry, &mut rt, &prop, &mut fetched, -1));
    assert_eq!(fetched, NativeValue::Zeroed);

    // the engine keeps working on registered kinds afterwards
    push_one(&registry, &mut rt, &int_prop("n"), &NativeValue::Int(5));
}

// ======================================================================
// Containers
// ======================================================================

#[test]
fn sequence_round_trip_preserves_order() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    let prop = array_prop("xs");
    let original = NativeValue::Array(ArrayValue::from(vec![
        NativeValue::Int(10),
        NativeValue::Int(20),
        NativeValue::Int(30),
    ]));
    push_one(&registry, &mut rt, &prop, &original);

    let mut fetched = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut fetched, -1));
    assert_eq!(fetched, original);
}

#[test]
fn fetch_truncates_destination() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = array_prop("xs");

    // a 2-entry table
    push_one(
        &registry,
        &mut rt,
        &prop,
        &NativeValue::Array(ArrayValue::from(vec![
            NativeValue::Int(1),
            NativeValue::Int(2),
        ])),
    );

    // into a 5-element destination
    let mut dest = NativeValue::Array(ArrayValue::from(vec![NativeValue::Int(9); 5]));
    assert!(fetch_property(&registry, &mut rt, &prop, &mut dest, -1));
    let NativeValue::Array(arr) = dest else {
        panic!("expected array, got {dest:?}");
    };
    assert_eq!(arr.num(), 2);
    assert_eq!(arr.elements(), &[NativeValue::Int(1), NativeValue::Int(2)]);
}

#[test]
fn empty_table_fetch_empties_container() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    rt.stack.push_new_table();
    let mut dest = NativeValue::Array(ArrayValue::from(vec![NativeValue::Int(9); 3]));
    assert!(fetch_property(&registry, &mut rt, &array_prop("xs"), &mut dest, -1));
    let NativeValue::Array(arr) = dest else {
        panic!("expected array, got {dest:?}");
    };
    assert_eq!(arr.num(), 0);
}

#[test]
fn set_fetch_rehashes_to_distinct_values() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new(
        "tags",
        PropertyType::Set {
            element: Box::new(int_prop("element")),
        },
    );

    // a table holding duplicate values
    rt.stack.push_new_table();
    for (i, v) in [1i64, 2, 1, 3, 2].iter().enumerate() {
        rt.stack.push(ScriptValue::Integer(*v));
        rt.stack.set_index(-2, i as i64 + 1).unwrap();
    }

    let mut dest = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut dest, -1));
    let NativeValue::Set(set) = dest else {
        panic!("expected set, got {dest:?}");
    };
    assert_eq!(set.num(), 3);
    assert!(set.is_lookup_valid());
    assert!(set.contains(&NativeValue::Int(3)));
    assert!(!set.contains(&NativeValue::Int(4)));
}

#[test]
fn map_round_trip_pairs_keys_and_values() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new(
        "scores",
        PropertyType::Map {
            key: Box::new(Property::new("key", PropertyType::Str)),
            value: Box::new(int_prop("value")),
        },
    );

    // fetch { a = 1, b = 2 }
    let table = rt.stack.push_new_table();
    rt.stack
        .table_mut(table)
        .unwrap()
        .set(ScriptKey::Str("a".into()), ScriptValue::Integer(1));
    rt.stack
        .table_mut(table)
        .unwrap()
        .set(ScriptKey::Str("b".into()), ScriptValue::Integer(2));

    let mut dest = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut dest, -1));
    let NativeValue::Map(ref map) = dest else {
        panic!("expected map, got {dest:?}");
    };
    assert_eq!(map.num(), 2);
    assert_eq!(
        map.get(&NativeValue::Str("a".into())),
        Some(&NativeValue::Int(1))
    );
    assert_eq!(
        map.get(&NativeValue::Str("b".into())),
        Some(&NativeValue::Int(2))
    );

    // push it back and check the table holds exactly the two pairs
    push_one(&registry, &mut rt, &prop, &dest);
    let ScriptValue::Table(out) = rt.stack.value_at(-1).unwrap().clone() else {
        panic!("expected table");
    };
    let out = rt.stack.table(out).unwrap();
    assert_eq!(out.num_entries(), 2);
    assert_eq!(
        out.get(&ScriptKey::Str("a".into())),
        Some(&ScriptValue::Integer(1))
    );
    assert_eq!(
        out.get(&ScriptKey::Str("b".into())),
        Some(&ScriptValue::Integer(2))
    );
}

#[test]
fn nested_containers_recurse() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new(
        "grid",
        PropertyType::Array {
            element: Box::new(array_prop("row")),
        },
    );

    let original = NativeValue::Array(ArrayValue::from(vec![
        NativeValue::Array(ArrayValue::from(vec![NativeValue::Int(1), NativeValue::Int(2)])),
        NativeValue::Array(ArrayValue::from(vec![NativeValue::Int(3)])),
    ]));
    push_one(&registry, &mut rt, &prop, &original);

    let mut fetched = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut fetched, -1));
    assert_eq!(fetched, original);
}

// ======================================================================
// Aggregates
// ======================================================================

#[test]
fn enum_marshals_underlying_integer_without_range_check() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new(
        "state",
        PropertyType::Enum {
            underlying: Box::new(Property::new("underlying", PropertyType::UInt8)),
            def: None,
        },
    );

    push_one(&registry, &mut rt, &prop, &NativeValue::Int(2));
    assert_eq!(rt.stack.value_at(-1).unwrap(), &ScriptValue::Integer(2));
    rt.stack.pop(1);

    // 999 is not a declared value; it still lands, wrapped to the
    // underlying byte storage
    rt.stack.push(ScriptValue::Integer(999));
    let mut cell = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Int(999 % 256));
}

#[test]
fn struct_round_trips_by_field_name() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    let layout = Arc::new(StructDef::new(
        "Vec2",
        vec![
            Property::new("X", PropertyType::Double),
            Property::new("Y", PropertyType::Double),
        ],
    ));
    let prop = Property::new(
        "pos",
        PropertyType::Struct {
            layout: Some(Arc::clone(&layout)),
        },
    );

    let original = NativeValue::Struct(StructValue {
        layout: Arc::clone(&layout),
        fields: vec![NativeValue::Number(1.5), NativeValue::Number(-2.0)],
    });
    push_one(&registry, &mut rt, &prop, &original);

    let ScriptValue::Table(table) = rt.stack.value_at(-1).unwrap().clone() else {
        panic!("expected table");
    };
    assert_eq!(
        rt.stack.table(table).unwrap().get(&ScriptKey::Str("X".into())),
        Some(&ScriptValue::Number(1.5))
    );

    let mut fetched = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut fetched, -1));
    assert_eq!(fetched, original);
}

#[test]
fn unresolved_struct_layout_degrades_to_nil() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new("mystery", PropertyType::Struct { layout: None });

    let pushed = push_property(&registry, &mut rt, &prop, &NativeValue::Zeroed, PushOpts::default());
    assert_eq!(pushed, 1);
    assert_eq!(rt.stack.value_at(-1).unwrap(), &ScriptValue::Nil);

    let mut cell = NativeValue::Zeroed;
    assert!(!fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
}

#[test]
fn null_object_pushes_nil() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let prop = Property::new("target", PropertyType::Object);

    push_one(&registry, &mut rt, &prop, &NativeValue::Object(None));
    assert_eq!(rt.stack.value_at(-1).unwrap(), &ScriptValue::Nil);
}

#[test]
fn object_fetch_takes_a_counted_reference() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let class = ClassRef::new(ClassDef::new("Actor", vec![]));
    let handle = rt.heap.allocate_instance(class, &mut rt.delegates);
    assert_eq!(rt.heap.ref_count(handle), Some(1));

    let prop = Property::new("target", PropertyType::Object);
    rt.stack.push(ScriptValue::Object(handle));
    let mut cell = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Object(Some(handle)));
    assert_eq!(rt.heap.ref_count(handle), Some(2));

    // destroying the cell gives the reference back
    prop.destroy_value(&mut cell, &mut rt.heap, &mut rt.delegates);
    assert_eq!(rt.heap.ref_count(handle), Some(1));
}

#[test]
fn class_reference_round_trips_by_identity() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let class = ClassRef::new(ClassDef::new("Actor", vec![]));
    let prop = Property::new("kind", PropertyType::Class);

    push_one(&registry, &mut rt, &prop, &NativeValue::Class(Some(class.clone())));
    let mut cell = NativeValue::Zeroed;
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert_eq!(cell, NativeValue::Class(Some(class)));
}

// ======================================================================
// Delegates
// ======================================================================

fn delegate_signature() -> Arc<FunctionDef> {
    Arc::new(FunctionDef::new(
        "OnScored",
        vec![int_prop("points").with_flags(PropertyFlags::PARM)],
        NativeEntry::Internal,
    ))
}

#[test]
fn single_delegate_binds_and_overwrites() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let signature = delegate_signature();
    let prop = Property::new(
        "on_scored",
        PropertyType::Delegate {
            signature: Arc::clone(&signature),
        },
    );
    let mut cell = prop.initialize_value(&mut rt.delegates);

    let seen = Rc::new(Cell::new(0i64));
    let seen_in_body = Rc::clone(&seen);
    let first = rt.stack.register_closure(
        "first",
        Some(NativeFn::named("first", move |args: &mut lualink::CallArgs<'_>| {
            seen_in_body.set(args.cells[0].as_int().unwrap_or(0));
            Ok(())
        })),
    );
    let second = rt.stack.register_closure("second", None);

    // bind, then rebind: single slots overwrite
    rt.stack.push(ScriptValue::Closure(first));
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    rt.stack.pop(1);
    rt.stack.push(ScriptValue::Closure(second));
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    rt.stack.pop(1);
    rt.stack.push(ScriptValue::Closure(first));
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    rt.stack.pop(1);

    let mut cells = vec![NativeValue::Int(17)];
    assert_eq!(fire_delegate(&mut rt, &signature, &cell, &mut cells), 1);
    assert_eq!(seen.get(), 17);

    // pushing the bound delegate produces an adapter, not nil
    push_one(&registry, &mut rt, &prop, &cell);
    assert!(matches!(
        rt.stack.value_at(-1).unwrap(),
        ScriptValue::Adapter(_)
    ));

    prop.destroy_value(&mut cell, &mut rt.heap, &mut rt.delegates);
    assert_eq!(rt.delegates.live_slots(), 0);
}

#[cfg(not(feature = "legacy-multicast"))]
#[test]
fn multicast_fetch_appends_unique_bindings() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let signature = delegate_signature();
    let prop = Property::new(
        "on_scored",
        PropertyType::MulticastInline {
            signature: Arc::clone(&signature),
        },
    );
    let mut cell = prop.initialize_value(&mut rt.delegates);

    let count = Rc::new(Cell::new(0u32));
    let mut closures = Vec::new();
    for name in ["a", "b"] {
        let count_in_body = Rc::clone(&count);
        closures.push(rt.stack.register_closure(
            name,
            Some(NativeFn::named(name, move |_: &mut lualink::CallArgs<'_>| {
                count_in_body.set(count_in_body.get() + 1);
                Ok(())
            })),
        ));
    }

    // duplicate bind of `a` is not re-added
    for closure in [closures[0], closures[1], closures[0]] {
        rt.stack.push(ScriptValue::Closure(closure));
        assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
        rt.stack.pop(1);
    }

    let mut cells = vec![NativeValue::Int(0)];
    assert_eq!(fire_delegate(&mut rt, &signature, &cell, &mut cells), 2);
    assert_eq!(count.get(), 2);
}

#[cfg(not(feature = "legacy-multicast"))]
#[test]
fn sparse_delegate_stores_bindings_out_of_line() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();
    let signature = delegate_signature();
    let prop = Property::new(
        "on_hit",
        PropertyType::MulticastSparse {
            signature: Arc::clone(&signature),
        },
    );
    let mut cell = prop.initialize_value(&mut rt.delegates);
    // sparse storage lives in the side table, not in a slot
    assert_eq!(rt.delegates.live_slots(), 0);

    let closure = rt.stack.register_closure("handler", None);
    rt.stack.push(ScriptValue::Closure(closure));
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    assert!(fetch_property(&registry, &mut rt, &prop, &mut cell, -1));
    rt.stack.pop(1);

    let NativeValue::Sparse(ref sparse) = cell else {
        panic!("expected sparse cell, got {cell:?}");
    };
    assert_eq!(rt.delegates.sparse_bindings(sparse).len(), 1);
}

// ======================================================================
// Call marshalling
// ======================================================================

#[test]
fn call_frame_lifecycle() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    // fn add(a: i32, b: i32, out remainder: str) -> i32
    let body = NativeFn::named("add", |args: &mut lualink::CallArgs<'_>| {
        let a = args.cells[1].as_int().unwrap_or(0);
        let b = args.cells[2].as_int().unwrap_or(0);
        args.cells[0] = NativeValue::Int(a + b);
        args.cells[3] = NativeValue::Str(format!("{a}+{b}"));
        Ok(())
    });
    let func = FunctionDef::new(
        "Add",
        vec![
            int_prop("ret").with_flags(PropertyFlags::PARM | PropertyFlags::RETURN_PARM),
            int_prop("a").with_flags(PropertyFlags::PARM),
            int_prop("b").with_flags(PropertyFlags::PARM),
            Property::new("detail", PropertyType::Str)
                .with_flags(PropertyFlags::PARM | PropertyFlags::OUT_PARM),
        ],
        NativeEntry::Internal,
    )
    .with_default_impl(body);

    rt.stack.push(ScriptValue::Integer(30));
    rt.stack.push(ScriptValue::Integer(12));
    let pushed = call_function(&registry, &mut rt, &func, None, 1, false);

    // return first, then the out-param
    assert_eq!(pushed, 2);
    assert_eq!(rt.stack.value_at(-2).unwrap(), &ScriptValue::Integer(42));
    assert_eq!(
        rt.stack.value_at(-1).unwrap(),
        &ScriptValue::Str("30+12".into())
    );
    // the two arguments are still where the caller left them
    assert_eq!(rt.stack.top(), 4);
}

#[test]
fn pure_out_params_consume_no_slots() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    // fn f(a: i32, out o: i32, b: i32); inputs must read slots 1 and 2
    let body = NativeFn::named("f", |args: &mut lualink::CallArgs<'_>| {
        let a = args.cells[0].as_int().unwrap_or(0);
        let b = args.cells[2].as_int().unwrap_or(0);
        args.cells[1] = NativeValue::Int(a * 100 + b);
        Ok(())
    });
    let func = FunctionDef::new(
        "F",
        vec![
            int_prop("a").with_flags(PropertyFlags::PARM),
            int_prop("o").with_flags(PropertyFlags::PARM | PropertyFlags::OUT_PARM),
            int_prop("b").with_flags(PropertyFlags::PARM),
        ],
        NativeEntry::Internal,
    )
    .with_default_impl(body);

    rt.stack.push(ScriptValue::Integer(7));
    rt.stack.push(ScriptValue::Integer(9));
    let pushed = call_function(&registry, &mut rt, &func, None, 1, false);

    assert_eq!(pushed, 1);
    assert_eq!(rt.stack.value_at(-1).unwrap(), &ScriptValue::Integer(709));
}

#[test]
fn frame_destructs_params_once_even_on_fetch_failure() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    // a delegate parameter allocates a slot at construction; an integer
    // argument cannot fetch into it, but the frame must still free the slot
    let func = FunctionDef::new(
        "Bind",
        vec![Property::new(
            "hook",
            PropertyType::Delegate {
                signature: delegate_signature(),
            },
        )
        .with_flags(PropertyFlags::PARM)],
        NativeEntry::Internal,
    );

    rt.stack.push(ScriptValue::Integer(5));
    let pushed = call_function(&registry, &mut rt, &func, None, 1, false);
    assert_eq!(pushed, 0);
    assert_eq!(rt.delegates.live_slots(), 0);
}

// Builds a trampoline-entry event function on a fresh target, with flags
// recording whether the default body ran.
fn tick_func(rt: &mut Runtime) -> (FunctionDef, ObjectHandle, Rc<Cell<bool>>) {
    let default_ran = Rc::new(Cell::new(false));
    let default_flag = Rc::clone(&default_ran);
    let func = FunctionDef::new("Tick", vec![], NativeEntry::Trampoline)
        .with_flags(FunctionFlags::NATIVE | FunctionFlags::SCRIPT_EVENT)
        .with_default_impl(NativeFn::named(
            "Tick_default",
            move |_: &mut lualink::CallArgs<'_>| {
                default_flag.set(true);
                Ok(())
            },
        ));
    let class = ClassRef::new(ClassDef::new("Actor", vec![]));
    let target = rt.heap.allocate_instance(class, &mut rt.delegates);
    (func, target, default_ran)
}

fn install_override(rt: &mut Runtime, func: &FunctionDef, target: ObjectHandle) -> Rc<Cell<bool>> {
    let override_ran = Rc::new(Cell::new(false));
    let override_flag = Rc::clone(&override_ran);
    let closure = rt.stack.register_closure(
        "Tick_override",
        Some(NativeFn::named(
            "Tick_override",
            move |_: &mut lualink::CallArgs<'_>| {
                override_flag.set(true);
                Ok(())
            },
        )),
    );
    rt.heap
        .get_mut(target)
        .unwrap()
        .set_override(func.name.hash(), closure);
    override_ran
}

#[test]
fn script_call_dispatches_installed_override() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    let (func, target, default_ran) = tick_func(&mut rt);
    let override_ran = install_override(&mut rt, &func, target);

    let flags_before = func.flags.get();
    let pushed = call_function(&registry, &mut rt, &func, Some(target), 1, false);
    assert_eq!(pushed, 0);

    assert!(override_ran.get());
    assert!(!default_ran.get());
    assert_eq!(func.flags.get(), flags_before);
    assert_eq!(*func.entry.borrow(), NativeEntry::Trampoline);
}

#[test]
fn call_without_override_strips_trampoline_and_restores_entry() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    let (func, target, default_ran) = tick_func(&mut rt);

    let flags_before = func.flags.get();
    let pushed = call_function(&registry, &mut rt, &func, Some(target), 1, false);
    assert_eq!(pushed, 0);

    // no override installed, so the call falls through to the default body
    assert!(default_ran.get());
    // flag and entry are bit-for-bit restored
    assert_eq!(func.flags.get(), flags_before);
    assert_eq!(*func.entry.borrow(), NativeEntry::Trampoline);

    // a native-initiated event on the restored function still works
    default_ran.set(false);
    let mut cells: Vec<NativeValue> = vec![];
    process_event(&mut rt, &func, Some(target), &mut cells).unwrap();
    assert!(default_ran.get());
}

#[test]
fn parent_default_call_skips_installed_override() {
    let registry = initialize().unwrap();
    let mut rt = Runtime::new();

    let (func, target, default_ran) = tick_func(&mut rt);
    let override_ran = install_override(&mut rt, &func, target);

    let flags_before = func.flags.get();
    let pushed = call_function(&registry, &mut rt, &func, Some(target), 1, true);
    assert_eq!(pushed, 0);

    // an explicit parent-default call runs the native body even though an
    // override is installed
    assert!(default_ran.get());
    assert!(!override_ran.get());
    assert_eq!(func.flags.get(), flags_before);
    assert_eq!(*func.entry.borrow(), NativeEntry::Trampoline);
}
