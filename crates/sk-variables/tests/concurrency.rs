use sk_core::Value;
use sk_variables::{Change, GlobalVariables, VariableName};
use std::sync::Arc;
use std::thread;

fn name(raw: &str) -> VariableName {
    VariableName::parse(raw).unwrap()
}

#[test]
fn test_concurrent_adds_to_same_key_are_not_lost() {
    let globals = Arc::new(GlobalVariables::new());
    let counter = name("counter");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let globals = Arc::clone(&globals);
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    globals
                        .change(&counter, &Change::Add(vec![Value::from(1.0)]))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(globals.get(&counter), Some(Value::from(2000.0)));
}

#[test]
fn test_concurrent_list_appends_keep_every_element() {
    let globals = Arc::new(GlobalVariables::new());
    let list = name("log::*");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let globals = Arc::clone(&globals);
            let list = list.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let value = Value::from(format!("{t}-{i}"));
                    globals.change(&list, &Change::Add(vec![value])).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = globals.entries(&list);
    assert_eq!(entries.len(), 200);
    let mut indices: Vec<usize> = entries.iter().map(|(i, _)| i.parse().unwrap()).collect();
    indices.sort_unstable();
    assert_eq!(indices, (1..=200).collect::<Vec<_>>());
}

#[test]
fn test_writer_on_one_key_does_not_block_another() {
    let globals = Arc::new(GlobalVariables::new());
    let a = name("a::x");
    let b = name("b");

    // Hold the write lock of `a` while another thread writes `b`
    globals.update(&a, |_| {
        let globals = Arc::clone(&globals);
        let b = b.clone();
        thread::spawn(move || globals.set(&b, Value::from(1.0)).unwrap())
            .join()
            .unwrap();
    });

    assert_eq!(globals.get(&b), Some(Value::from(1.0)));
}
