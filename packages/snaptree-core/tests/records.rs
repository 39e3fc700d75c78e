use snaptree_core::{
    apply_patches, freeze, path, produce, produce_with_patches, Error, PatchOp, Value,
};
use snaptree_test_support::{intc, Portfolio, Stock};

fn state() -> Value {
    freeze(Value::map([("stock", intc())])).unwrap()
}

#[test]
fn record_methods_run_on_a_clone_and_keep_derived_members() {
    let base = state();
    let next = produce(&base, |d| {
        d.child("stock")?.update_record(|s: &mut Stock| {
            s.push_price(101.0).push_price(102.0);
        })
    })
    .unwrap();

    let before = base.get("stock").unwrap();
    let after = next.get("stock").unwrap();
    assert_eq!(before.record_ref::<Stock>().unwrap().price(), 100.0);
    assert_eq!(after.record_ref::<Stock>().unwrap().price(), 102.0);
    assert!(!before.ptr_eq(&after));
    assert!(after.is_deep_sealed());
}

#[test]
fn member_drafts_finalize_through_the_record_clone() {
    let next = produce(&state(), |d| {
        d.child("stock")?.child("price_history")?.push(101.0)?;
        d.child("stock")?.set("name", "Intel Corp")
    })
    .unwrap();
    let stock = next.get("stock").unwrap();
    let stock = stock.record_ref::<Stock>().unwrap();
    assert_eq!(stock.price_history, vec![100.0, 101.0]);
    assert_eq!(stock.price(), 101.0);
    assert_eq!(stock.name, "Intel Corp");
}

#[test]
fn pending_member_writes_are_folded_before_record_methods() {
    produce(&state(), |d| {
        let stock = d.child("stock")?;
        let history = stock.child("price_history")?;
        history.push(101.0)?;
        let price = stock.update_record(|s: &mut Stock| s.push_price(102.0).price())?;
        assert_eq!(price, 102.0);
        assert!(matches!(history.push(103.0), Err(Error::StaleDraft(_))));
        assert_eq!(
            stock.read("price_history")?,
            Some(Value::seq(vec![100.0, 101.0, 102.0]))
        );
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn record_method_changes_are_recorded_as_replace() {
    let base = state();
    let out = produce_with_patches(&base, |d| {
        d.child("stock")?
            .update_record(|s: &mut Stock| {
                s.push_price(101.0);
            })
    })
    .unwrap();

    assert_eq!(out.patches.len(), 1);
    let patch = &out.patches[0];
    assert_eq!(patch.op, PatchOp::Replace);
    assert_eq!(patch.path, path!["stock", "price_history"]);
    assert_eq!(patch.value, Some(Value::seq(vec![100.0, 101.0])));

    assert_eq!(apply_patches(&base, &out.patches).unwrap(), out.value);
    assert_eq!(apply_patches(&out.value, &out.inverse_patches).unwrap(), base);
}

#[test]
fn record_shape_is_fixed() {
    produce(&state(), |d| {
        let stock = d.child("stock")?;
        assert!(matches!(stock.remove("name"), Err(Error::TypeMismatch(_))));
        assert!(matches!(stock.set("price", 1.0), Err(Error::MissingKey(_))));
        assert!(matches!(
            stock.update_record(|p: &mut Portfolio| p.owner.clear()),
            Err(Error::TypeMismatch(_))
        ));
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn freezing_a_record_leaves_the_callers_members_alone() {
    let holdings = Value::map([("INTC", intc())]);
    let portfolio = Value::record(Portfolio::new("ada", holdings.clone()));
    let frozen = freeze(portfolio.clone()).unwrap();

    assert!(frozen.is_deep_sealed());
    assert!(!portfolio.is_sealed());
    assert!(!holdings.is_sealed());
    assert!(!frozen.get("holdings").unwrap().ptr_eq(&holdings));
    assert_eq!(frozen, portfolio);
}

#[test]
fn records_compare_by_structural_members() {
    let a = Value::record(Stock::new("INTC", "Intel", vec![100.0]));
    let b = Value::record(Stock::new("INTC", "Intel", vec![100.0]));
    let c = Value::record(Stock::new("INTC", "Intel", vec![100.0, 1.0]));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn assigned_member_survives_being_drafted_again() {
    let next = produce(&state(), |d| {
        let stock = d.child("stock")?;
        stock.set("price_history", Value::seq(vec![1.0]))?;
        let history = stock.child("price_history")?;
        assert_eq!(history.len()?, 1);
        Ok::<_, Error>(())
    })
    .unwrap();
    let stock = next.get("stock").unwrap();
    assert_eq!(stock.record_ref::<Stock>().unwrap().price_history, vec![1.0]);
}

#[test]
fn redrafted_member_patches_replay_to_the_produced_record() {
    let base = state();
    let out = produce_with_patches(&base, |d| {
        let stock = d.child("stock")?;
        stock.set("price_history", Value::seq(vec![1.0]))?;
        stock.child("price_history")?;
        Ok::<_, Error>(())
    })
    .unwrap();

    let stock = out.value.get("stock").unwrap();
    assert_eq!(stock.record_ref::<Stock>().unwrap().price_history, vec![1.0]);
    assert_eq!(apply_patches(&base, &out.patches).unwrap(), out.value);
    assert_eq!(apply_patches(&out.value, &out.inverse_patches).unwrap(), base);
}

#[test]
fn assigned_member_is_folded_before_record_methods() {
    let next = produce(&state(), |d| {
        let stock = d.child("stock")?;
        stock.set("price_history", Value::seq(vec![1.0]))?;
        stock.child("price_history")?;
        stock.update_record(|s: &mut Stock| {
            s.push_price(2.0);
        })
    })
    .unwrap();
    let stock = next.get("stock").unwrap();
    assert_eq!(stock.record_ref::<Stock>().unwrap().price_history, vec![1.0, 2.0]);
}

#[test]
fn failed_fold_keeps_pending_member_writes() {
    produce(&state(), |d| {
        let stock = d.child("stock")?;
        let history = stock.child("price_history")?;
        history.push(101.0)?;
        history.push("not a price")?;
        assert!(matches!(
            stock.update_record(|s: &mut Stock| s.price()),
            Err(Error::TypeMismatch(_))
        ));

        // the member draft is still attached and the record is not lent out
        history.remove(2usize)?;
        let price = stock.update_record(|s: &mut Stock| s.price())?;
        assert_eq!(price, 101.0);
        Ok::<_, Error>(())
    })
    .unwrap();
}
