use std::sync::Arc;
use std::time::{Duration, Instant};

use sk_script::{builtin_syntax, CompileErrors, Script, ScriptCompiler, StatementKind, TriggerEvent};
use sk_syntax::{CompileErrorKind, Parser, ParserConfig};

fn compile(source: &str) -> Result<Script, CompileErrors> {
    let parser = Parser::new(builtin_syntax().unwrap(), ParserConfig::default());
    ScriptCompiler::new(Arc::new(parser), sk_core::TICK).compile("test", source)
}

fn errors(source: &str) -> Vec<(usize, CompileErrorKind)> {
    compile(source)
        .unwrap_err()
        .iter()
        .map(|error| (error.line, error.kind))
        .collect()
}

#[test]
fn test_compiles_triggers_with_sections() {
    let script = compile(
        "# greeting\n\
         on join:\n\
         \tif {greeting} is set:\n\
         \t\tbroadcast \"welcome %event-name%\"\n\
         \telse:\n\
         \t\tbroadcast \"welcome\"\n\
         \n\
         every 5 seconds:\n\
         \tadd 1 to {ticks}\n",
    )
    .unwrap();

    assert_eq!(script.name, "test");
    assert_eq!(script.triggers.len(), 2);

    let join = &script.triggers[0];
    assert_eq!(join.name, "on join");
    assert_eq!(join.line, 2);
    assert!(matches!(join.event, TriggerEvent::Event(_)));
    assert_eq!(join.body.len(), 2);
    assert!(matches!(join.body[0].kind, StatementKind::Section { .. }));

    let every = &script.triggers[1];
    assert_eq!(every.interval(), Some(std::time::Duration::from_secs(5)));
    assert_eq!(every.line, 8);
}

#[test]
fn test_top_level_statement_is_rejected() {
    assert_eq!(errors("broadcast \"hi\"\n"), vec![(1, CompileErrorKind::Structure)]);
}

#[test]
fn test_unknown_event() {
    let found = errors("on frobnication:\n    stop\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, 1);
}

#[test]
fn test_empty_trigger_and_section() {
    assert_eq!(errors("on load:\n"), vec![(1, CompileErrorKind::Structure)]);
    assert_eq!(
        errors("on load:\n    if 1 is 1:\n    stop\n"),
        vec![(2, CompileErrorKind::Structure)]
    );
}

#[test]
fn test_loop_words_outside_loop() {
    let found = errors("on load:\n    exit loop\n    broadcast \"%loop-value%\"\n    continue\n");
    let lines: Vec<usize> = found.iter().map(|(line, _)| *line).collect();
    assert_eq!(lines, vec![2, 3, 4]);
}

#[test]
fn test_loop_number_must_exist() {
    assert!(compile("on load:\n    loop 2 times:\n        broadcast \"%loop-value-2%\"\n").is_err());
    assert!(compile("on load:\n    loop 2 times:\n        broadcast \"%loop-value-1%\"\n").is_ok());
}

#[test]
fn test_single_variable_takes_single_value() {
    assert_eq!(errors("on load:\n    set {_x} to 1, 2 and 3\n").len(), 1);
    assert!(compile("on load:\n    set {_x::*} to 1, 2 and 3\n").is_ok());
}

#[test]
fn test_periodic_interval_must_be_positive() {
    assert_eq!(errors("every 0 seconds:\n    stop\n").len(), 1);
}

#[test]
fn test_else_must_follow_if() {
    let source = "on load:\n    loop 3 times:\n        stop\n    else if 1 is 1:\n        stop\n";
    assert_eq!(errors(source), vec![(4, CompileErrorKind::Structure)]);

    let chained = "on load:\n    if 1 is 2:\n        stop\n    else if 1 is 1:\n        stop\n    else:\n        stop\n";
    assert!(compile(chained).is_ok());
}

#[test]
fn test_errors_are_collected_across_triggers_in_line_order() {
    let source = "on load:\n    wobble\n\non custom event \"x\":\n    wibble\n  bad indent\n";
    let lines: Vec<usize> = errors(source).iter().map(|(line, _)| *line).collect();
    assert_eq!(lines, vec![2, 5, 6]);
}

#[test]
fn test_indentation_error() {
    assert_eq!(
        errors("    on load:\n        stop\n"),
        vec![(1, CompileErrorKind::Indentation)]
    );
}

fn terms(count: usize) -> Vec<String> {
    (1..=count).map(|n| n.to_string()).collect()
}

#[test]
fn test_long_operand_chains_compile_quickly() {
    let terms = terms(20);
    let source = format!(
        "on load:\n\tset {{_sum}} to {}\n\tset {{_list::*}} to {}\n\tset {{_mixed}} to {}\n",
        terms.join(" + "),
        terms.join(", "),
        terms[..12].join(" * 2 - "),
    );

    let started = Instant::now();
    let script = compile(&source).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(script.triggers[0].body.len(), 3);
    assert!(elapsed < Duration::from_secs(2), "compiling took {elapsed:?}");
}

#[test]
fn test_line_over_step_budget_is_a_compile_error() {
    let config = ParserConfig {
        max_line_steps: 40,
        ..ParserConfig::default()
    };
    let parser = Parser::new(builtin_syntax().unwrap(), config);
    let source = format!("on load:\n\tset {{_x}} to {}\n", terms(20).join(" + "));
    let errors = ScriptCompiler::new(Arc::new(parser), sk_core::TICK)
        .compile("test", &source)
        .unwrap_err();
    assert!(errors
        .iter()
        .any(|error| error.line == 2 && error.message.contains("too complex to parse")));
}

#[test]
fn test_function_declarations() {
    let script = compile(
        "function add(a: number, b: number) :: number:\n\
         \treturn {_a} + {_b}\n\
         on load:\n\
         \tset {_x} to add(1, add(2, 3))\n",
    )
    .unwrap();
    assert_eq!(script.functions, vec!["add"]);
    assert_eq!(script.triggers.len(), 1);

    assert_eq!(
        errors("function add(a: number):\n\tstop\nfunction add(b: number):\n\tstop\n"),
        vec![(3, CompileErrorKind::Structure)]
    );
    assert_eq!(
        errors("function add(a: widget):\n\tstop\n").len(),
        1
    );
    assert_eq!(
        errors("function add(a: number) :: number:\n\treturn 1, 2\n").len(),
        1
    );
    assert_eq!(
        errors("function add(a: number) :: number:\n\tstop\non load:\n\tset {_x} to add(1, 2)\n")
            .iter()
            .map(|(line, _)| *line)
            .collect::<Vec<_>>(),
        vec![4]
    );
}
