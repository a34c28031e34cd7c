//! End-to-end orchestrator scenarios driven against [`MockEngine`].

use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;

use optik::engine::mock::{MockEngine, ScriptedStep};
use optik::engine::{Engine, EVMTransaction, ExitStatus, TxKind, TxResult};
use optik::types::EVMU256;
use optik::value::Value;
use optik::world::{compute_new_contract_addr, AbstractTx, EVMRuntime, EVMWorld, WorldMonitor};

/// Records the recipient address of every pushed runtime's installed
/// transaction, in push order — the call stack's growth sequence, since no
/// pop can happen before the next push in a depth-first call tree.
struct PushLog(Rc<RefCell<Vec<optik::types::EVMAddress>>>);

impl WorldMonitor<MockEngine> for PushLog {
    fn on_new_runtime(&mut self, rt: &EVMRuntime<MockEngine>) {
        if let Some(tx) = rt.engine.contract().transaction.as_ref() {
            self.0.borrow_mut().push(tx.recipient);
        }
    }
}

fn addr(hex: &str) -> optik::types::EVMAddress {
    optik::types::parse_address(hex).unwrap()
}

fn addr_u256(hex: &str) -> EVMU256 {
    optik::types::address_to_u256(&addr(hex))
}

fn call_tx(sender: &str, recipient: &str) -> EVMTransaction {
    EVMTransaction {
        origin: Value::concrete(addr_u256(sender)),
        sender: Value::concrete(addr_u256(sender)),
        recipient: addr(recipient),
        value: Value::concrete(EVMU256::ZERO),
        data: Bytes::new(),
        gas_price: Value::concrete(EVMU256::ZERO),
        gas_limit: Value::concrete(EVMU256::from(1_000_000u64)),
        kind: TxKind::Call,
        ret_offset: EVMU256::ZERO,
        ret_len: EVMU256::ZERO,
        result: TxResult::default(),
    }
}

/// A CREATE emitted by `deployer_contract` itself: its own address is the
/// deployer the new contract is attributed to.
fn create_tx(deployer_contract: &str) -> EVMTransaction {
    let mut tx = call_tx(deployer_contract, deployer_contract);
    tx.kind = TxKind::Create;
    tx.recipient = optik::types::EVMAddress::zero();
    tx
}

fn deploy(world: &mut EVMWorld<MockEngine>, address: &str, initialized: bool) {
    world
        .deploy("", addr(address), addr("0x0000000000000000000000000000000000000009"), &[], initialized)
        .unwrap();
}

fn queue(world: &EVMWorld<MockEngine>, address: &str, steps: Vec<ScriptedStep>) {
    world.with_contract_root_engine_mut(addr(address), |e| e.queue_frame(steps)).unwrap();
}

/// S1: a single top-level transaction that exits normally.
#[test]
fn single_transaction_normal_exit() {
    let a = "0x00000000000000000000000000000000000000a1";
    let mut world = EVMWorld::new(MockEngine::new_evm());
    deploy(&mut world, a, true);
    queue(&world, a, vec![ScriptedStep::exit(ExitStatus::Stop)]);

    world.queue_transaction(AbstractTx::new(call_tx("0x00000000000000000000000000000000000000b1", a)));

    world.run().unwrap();
    assert_eq!(world.current_tx_num(), 1);
    assert!(world.call_stack().is_empty());
}

/// S2: A calls B which calls A back (direct reentrancy); the call stack
/// must read [A, B, A] at its deepest point, and both returns must resolve
/// their own caller frame correctly (the `depth_at` self-call fix).
#[test]
fn reentrant_call_stack_is_a_b_a() {
    let a = "0x00000000000000000000000000000000000000a2";
    let b = "0x00000000000000000000000000000000000000b2";
    let mut world = EVMWorld::new(MockEngine::new_evm());
    deploy(&mut world, a, true);
    deploy(&mut world, b, true);

    // A's top-level frame: calls into B, then exits once B returns.
    queue(&world, a, vec![ScriptedStep::suspend(call_tx(a, b)), ScriptedStep::exit(ExitStatus::Stop)]);
    // B's frame: calls back into A (reentrant), then exits once A returns.
    queue(&world, b, vec![ScriptedStep::suspend(call_tx(b, a)), ScriptedStep::exit(ExitStatus::Stop)]);
    // A's second (reentrant) frame: just exits.
    queue(&world, a, vec![ScriptedStep::exit(ExitStatus::Stop)]);

    world.queue_transaction(AbstractTx::new(call_tx("0x00000000000000000000000000000000000000c2", a)));

    let pushes = Rc::new(RefCell::new(Vec::new()));
    world.attach_monitor(Rc::new(RefCell::new(PushLog(Rc::clone(&pushes))))).unwrap();

    world.run().unwrap();
    assert_eq!(*pushes.borrow(), vec![addr(a), addr(b), addr(a)]);
    assert!(world.call_stack().is_empty());
}

/// S3: a reverted sub-call still bumps `current_tx_num` for the attempted
/// call, on top of the top-level transaction's own increment.
#[test]
fn revert_still_advances_tx_num() {
    let a = "0x00000000000000000000000000000000000000a3";
    let b = "0x00000000000000000000000000000000000000b3";
    let mut world = EVMWorld::new(MockEngine::new_evm());
    deploy(&mut world, a, true);
    deploy(&mut world, b, true);

    queue(&world, a, vec![ScriptedStep::suspend(call_tx(a, b)), ScriptedStep::exit(ExitStatus::Stop)]);
    queue(&world, b, vec![ScriptedStep::exit(ExitStatus::Revert)]);

    world.queue_transaction(AbstractTx::new(call_tx("0x00000000000000000000000000000000000000d3", a)));

    world.run().unwrap();
    assert_eq!(world.current_tx_num(), 2, "top-level tx plus the sub-call each bump the counter once");
}

/// S4: a CREATE whose constructor exits successfully deploys the new
/// contract at the predictable nonce-derived address.
#[test]
fn create_success_deploys_contract() {
    let deployer_contract = "0x00000000000000000000000000000000000000a4";
    let mut world = EVMWorld::new(MockEngine::new_evm());
    deploy(&mut world, deployer_contract, true);

    let new_addr = compute_new_contract_addr(&addr(deployer_contract), 1);

    queue(
        &world,
        deployer_contract,
        vec![
            ScriptedStep::suspend(create_tx(deployer_contract)),
            ScriptedStep::exit(ExitStatus::Stop),
        ],
    );
    // No script is staged for `new_addr`: MockEngine::run defaults to an
    // immediate successful exit when a frame's script is empty, so the
    // constructor succeeds without needing one.

    world.queue_transaction(AbstractTx::new(call_tx(
        "0x00000000000000000000000000000000000000c4",
        deployer_contract,
    )));

    world.run().unwrap();
    assert!(world.is_deployed(new_addr));
    assert_eq!(world.nonce_of(addr(deployer_contract)), Some(2));
    assert!(world.call_stack().is_empty());
}

/// S5: a CREATE whose constructor reverts leaves the new address absent
/// from the deployed contracts and pushes 0 onto the caller's stack.
#[test]
fn create_failure_removes_new_contract() {
    let deployer_contract = "0x00000000000000000000000000000000000000a5";
    let root = MockEngine::new_evm();
    // Clones of a MockEngine share its underlying Rc-backed state, so this
    // handle can stage a script for a contract that doesn't exist yet.
    let root_handle = root.clone();
    let mut world = EVMWorld::new(root);
    deploy(&mut world, deployer_contract, true);

    let new_addr = compute_new_contract_addr(&addr(deployer_contract), 1);
    root_handle.stage_script_for_address(new_addr, vec![ScriptedStep::exit(ExitStatus::Revert)]);

    queue(
        &world,
        deployer_contract,
        vec![
            ScriptedStep::suspend(create_tx(deployer_contract)),
            ScriptedStep::exit(ExitStatus::Stop),
        ],
    );

    world.queue_transaction(AbstractTx::new(call_tx(
        "0x00000000000000000000000000000000000000c5",
        deployer_contract,
    )));

    world.run().unwrap();
    assert!(!world.is_deployed(new_addr), "a reverted constructor must not leave the contract deployed");
    assert!(world.call_stack().is_empty());
}
