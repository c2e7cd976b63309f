//! The user-facing failure modes and their messages.

use opscript_script::{preprocess, Bindings, Error};

fn compile_err(source: &str) -> Error {
    preprocess(source, Bindings::default(), "bytecode").unwrap_err()
}

#[test]
fn oversized_push_is_rejected() {
    let err = compile_err(&format!(r#"push("0x{}")"#, "11".repeat(33)));
    assert!(
        err.to_string().contains("cannot accept values larger than 32 bytes"),
        "{err}"
    );
}

#[test]
fn push_n_width_mismatch() {
    let err = compile_err(r#"push3("0x1234")"#);
    assert_eq!(
        err.to_string(),
        "Function push3() expected 3 bytes but received 2"
    );
}

#[test]
fn non_hex_string_needs_hex_helper() {
    let err = compile_err(r#"push("price")"#);
    assert!(
        err.to_string().contains("only a hex literal is allowed"),
        "{err}"
    );
}

#[test]
fn action_result_is_not_raw_data() {
    let err = compile_err("x = add()\npush(x)");
    assert!(
        err.to_string().contains("raw data is required"),
        "{err}"
    );
}

#[test]
fn scalar_is_not_a_jump_label() {
    let err = compile_err("jump(5)");
    assert!(
        err.to_string().contains("jump label"),
        "{err}"
    );
}

#[test]
fn seventeen_pushes_exceed_dup_reach() {
    let mut source = String::from("[x] = push(1)\n");
    for i in 0..16 {
        source.push_str(&format!("push({i})\n"));
    }
    source.push_str("dup(x)");
    let err = compile_err(&source);
    assert!(err.to_string().contains("17 items deep"), "{err}");
}

#[test]
fn consumed_reference_is_reported() {
    let err = compile_err("[x] = push(1)\npop()\ndup(x)");
    assert_eq!(
        err.to_string(),
        "stack slot referenced in call to `dup()` won't exist on the stack during runtime"
    );
}

#[test]
fn swap_of_single_item_stack() {
    let err = compile_err("push(1)\nswap1()");
    assert_eq!(err.to_string(), "swap index out of range");
}

#[test]
fn unresolved_label() {
    let err = compile_err(r#"jump($ptr("nowhere"))"#);
    assert!(
        err.to_string().contains("`$ptr(\"nowhere\")` is not bound to an action"),
        "{err}"
    );
}

#[test]
fn helper_names_are_reserved() {
    let err = compile_err("push = 5");
    assert!(err.to_string().contains("helper"), "{err}");
}

#[test]
fn constants_stay_constant() {
    let err = compile_err("const N = 1\nN = 2");
    assert!(err.to_string().contains("cannot be reassigned"), "{err}");
}

#[test]
fn undefined_names_are_reported() {
    let err = compile_err("push(NOPE)");
    assert!(err.to_string().contains("`NOPE` is not defined"), "{err}");
}

#[test]
fn unknown_helper() {
    let err = compile_err("frobnicate()");
    assert!(err.to_string().contains("unknown helper `frobnicate()`"), "{err}");
}

#[test]
fn unknown_config_key() {
    let err = compile_err(r#"$("optimise", true)"#);
    assert!(err.to_string().contains("unrecognised config key"), "{err}");
}

#[test]
fn hex_text_has_a_size_limit() {
    let err = compile_err(&format!(r#"$hex("{}")"#, "x".repeat(33)));
    assert!(
        err.to_string().contains("cannot accept values larger than 32 bytes"),
        "{err}"
    );
}

#[test]
fn destructuring_requires_an_action() {
    let err = compile_err("[a, b] = 5");
    assert!(err.to_string().contains("cannot be destructured"), "{err}");
}

#[test]
fn dispatch_rejects_non_pointer_targets() {
    let err = compile_err(r#"dispatch({"foo()": 5})"#);
    assert!(err.to_string().contains("dispatch target"), "{err}");
}

#[test]
fn errors_carry_the_call_site() {
    let err = compile_err("push(1)\npush(\"price\")");
    let rendered = err.print_to_string("bytecode", "push(1)\npush(\"price\")", false);
    assert!(rendered.contains("bytecode"), "{rendered}");
    assert!(err.to_string().contains("2:"), "location missing: {err}");
}

#[test]
fn syntax_errors_surface() {
    assert!(matches!(compile_err("push(1) ???"), Error::Syntax(_)));
}
