use crate::*;

fn t(i: u32) -> TensorId {
    TensorId::new(i)
}

#[test]
fn test_sequence_drops_empty_programs() {
    let mut seq = Sequence::new();
    seq.add(Program::Noop);
    seq.add(Sequence::new());
    seq.add(Program::repeat(3, Program::Noop));
    assert!(seq.is_empty());
    assert_eq!(seq.into_program(), Program::Noop);
}

#[test]
fn test_copies_in_program_order() {
    let mut inner = Sequence::new();
    inner.add(Program::copy(t(1), t(2)));
    let mut seq = Sequence::new();
    seq.add(Program::copy(t(0), t(1)));
    seq.add(Program::repeat(4, inner));
    seq.add(Program::Call(FunctionId::new(0)));
    let program = seq.into_program();

    assert_eq!(program.copies(), vec![(t(0), t(1)), (t(1), t(2))]);
    assert_eq!(program.copy_count(), 2);
    assert_eq!(program.calls(), vec![FunctionId::new(0)]);
}

#[test]
fn test_repeat_of_zero_is_empty() {
    assert!(Program::repeat(0, Program::copy(t(0), t(1))).is_empty());
    assert!(!Program::repeat(1, Program::copy(t(0), t(1))).is_empty());
}

#[test]
fn test_program_serializes() {
    let program: Program =
        [Program::SetStochasticRounding(true), Program::copy(t(3), t(4))].into_iter().collect::<Sequence>().into();
    let json = serde_json::to_value(&program).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "sequence": [
                { "set_stochastic_rounding": true },
                { "copy": { "source": 3, "destination": 4 } },
            ]
        })
    );
}
