//! End-to-end programs run through the parser and the machine

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use emfrp::{ExecError, Machine, MachineError, Statement, Value, parse_program};

/// Runs every statement and returns the value of the last one.
fn run(machine: &mut Machine, code: &str) -> Result<Value, MachineError> {
    let statements = parse_program(code).expect("program should parse");
    let mut last = None;
    for statement in statements {
        last = Some(machine.execute(statement.node)?);
    }
    Ok(last.expect("program should not be empty"))
}

#[test]
fn sum_then_comparison() {
    let mut machine = Machine::new();
    assert_eq!(run(&mut machine, "node x = 3 + 4"), Ok(Value::Int(7)));
    assert_eq!(run(&mut machine, "node y = x > 5"), Ok(Value::TRUE));

    // Redefining `x` flows into `y`.
    assert_eq!(run(&mut machine, "node x = 1"), Ok(Value::Int(1)));
    assert_eq!(machine.current("y"), Some(&Value::FALSE));
}

#[test]
fn counter_counts_up() {
    let mut machine = Machine::new();
    assert_eq!(run(&mut machine, "node init[0] c = c@last + 1"), Ok(Value::Int(1)));

    for expected in 2..=5 {
        let recomputation = machine.indicate(&["c"]).unwrap();
        assert!(recomputation.is_clean());
        assert_eq!(recomputation.value_of("c"), Some(&Value::Int(expected)));
    }
    assert_eq!(machine.current("c"), Some(&Value::Int(5)));
    assert_eq!(machine.previous("c"), Some(&Value::Int(4)));
}

#[test]
fn wrapping_counter() {
    let code = "node init[0] tick = if tick@last >= 2 then 0 else tick@last + 1";
    let mut machine = Machine::new();
    run(&mut machine, code).unwrap();

    let mut seen = vec![machine.current("tick").cloned().unwrap()];
    for _ in 0..4 {
        machine.indicate(&["tick"]).unwrap();
        seen.push(machine.current("tick").cloned().unwrap());
    }
    assert_eq!(seen, [1, 2, 0, 1, 2].map(Value::Int));
}

#[test]
fn self_reference_is_rejected() {
    let mut machine = Machine::new();
    assert_eq!(
        run(&mut machine, "node x = x + 1"),
        Err(MachineError::Exec {
            node: "x".into(),
            error: ExecError::CyclicReference("x".into()),
        })
    );
    assert!(machine.node("x").is_none());
}

#[test]
fn last_of_another_node_is_rejected() {
    let mut machine = Machine::new();
    run(&mut machine, "node init[0] a = a@last + 1").unwrap();
    assert_eq!(
        run(&mut machine, "node b = a@last"),
        Err(MachineError::Exec {
            node: "b".into(),
            error: ExecError::MissingIdentifier("a".into()),
        })
    );
}

#[test]
fn last_without_init_has_no_history() {
    let mut machine = Machine::new();
    assert!(matches!(
        run(&mut machine, "node c = c@last + 1"),
        Err(MachineError::Exec {
            error: ExecError::MissingIdentifier(_),
            ..
        })
    ));
}

#[test]
fn top_level_expressions_see_nodes() {
    let mut machine = Machine::new();
    run(&mut machine, "node init[10] c = c@last * 2").unwrap();
    assert_eq!(run(&mut machine, "c + 1"), Ok(Value::Int(21)));
    // Outside any node body the previous value is readable.
    assert_eq!(run(&mut machine, "c@last"), Ok(Value::Int(10)));
    assert_eq!(
        run(&mut machine, "1 / 0"),
        Err(MachineError::Eval(ExecError::DivisionByZero))
    );
}

#[test]
fn switch_drives_led() {
    let level = Rc::new(Cell::new(false));
    let led = Rc::new(RefCell::new(Vec::new()));

    let mut machine = Machine::new();
    let input = level.clone();
    machine
        .add_input_node("switch", move || Value::bool(input.get()))
        .unwrap();
    let sink = led.clone();
    machine.add_output_node("led", move |value| sink.borrow_mut().push(value.clone()));

    machine.indicate(&["switch"]).unwrap();
    run(&mut machine, "node led = switch").unwrap();

    level.set(true);
    let recomputation = machine.indicate(&["switch"]).unwrap();
    assert_eq!(recomputation.value_of("switch"), Some(&Value::TRUE));
    assert_eq!(recomputation.value_of("led"), Some(&Value::TRUE));

    level.set(false);
    machine.indicate(&["switch"]).unwrap();

    assert_eq!(*led.borrow(), vec![Value::FALSE, Value::TRUE, Value::FALSE]);
}

#[test]
fn pulse_reads_own_history() {
    // `rising` fires once while `level` is high, then holds off.
    let code = "\
node init[false] level = input
node init[0] rising = if level && (rising@last == 0) then 1 else 0
";
    let mut machine = Machine::new();
    machine.set_value("input", Value::TRUE).unwrap();
    run(&mut machine, code).unwrap();
    assert_eq!(machine.current("rising"), Some(&Value::Int(1)));

    machine.indicate(&["input"]).unwrap();
    assert_eq!(machine.current("rising"), Some(&Value::Int(0)));
}

#[test]
fn chain_recomputes_in_dependency_order() {
    let code = "\
node a = base * 2
node b = a + 1
node c = a + b
";
    let mut machine = Machine::new();
    machine.set_value("base", Value::Int(1)).unwrap();
    run(&mut machine, code).unwrap();
    assert_eq!(machine.current("c"), Some(&Value::Int(5)));

    machine.set_value("base", Value::Int(10)).unwrap();
    let recomputation = machine.indicate(&["base"]).unwrap();
    let order: Vec<&str> = recomputation.updated.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(order, ["a", "b", "c"]);
    assert_eq!(machine.current("c"), Some(&Value::Int(41)));
}

#[test]
fn statements_listed_as_definitions() {
    let mut machine = Machine::new();
    run(&mut machine, "node x = 1\nnode init[0] c = c@last + x\nx + c").unwrap();
    let listed: Vec<String> = machine.definitions().map(ToString::to_string).collect();
    assert_eq!(listed, ["node x = 1", "node init[0] c = (c@last + x)"]);
    assert!(matches!(
        parse_program("node x = 1").unwrap()[0].node,
        Statement::Definition(_)
    ));
}
