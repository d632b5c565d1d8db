//! End-to-end exercise of the order aggregate across its full lifecycle.

use chrono::Utc;
use common::{OrderId, ReturnId};
use domain::{
    Actor, CustomerId, Money, Order, OrderReturn, OrderReturnSku, OrderReturnType,
    OrderShipment, OrderShipmentStatus, OrderSku, OrderStatus, ShipmentType, StoreCode,
    WarehouseCode,
};

fn two_shipment_order() -> Order {
    let id = OrderId::new();
    let physical = OrderShipment::new(
        "SHIP-P",
        id,
        ShipmentType::Physical,
        vec![
            OrderSku::new("SKU-001", 2, Money::from_cents(1500)),
            OrderSku::new("SKU-002", 1, Money::from_cents(700)),
        ],
        Utc::now(),
    );
    let electronic = OrderShipment::new(
        "SHIP-E",
        id,
        ShipmentType::Electronic,
        vec![OrderSku::new("SKU-D01", 1, Money::from_cents(999))],
        Utc::now(),
    );
    Order::new(
        id,
        "ORD-1000",
        CustomerId::new(),
        StoreCode::new("store1"),
        WarehouseCode::new("WH1"),
        "USD",
        vec![physical, electronic],
        Utc::now(),
        Actor::Customer("c1".into()),
    )
}

#[test]
fn full_lifecycle_to_completion() {
    let mut order = two_shipment_order();
    order.start_progress();

    // Allocate everything, ship the electronic shipment directly.
    for shipment in order.shipments_mut() {
        for sku in shipment.skus_mut() {
            let quantity = sku.quantity;
            sku.set_allocated_quantity(quantity).unwrap();
        }
        shipment.refresh_inventory_status();
        assert_eq!(shipment.status(), OrderShipmentStatus::InventoryAssigned);
    }

    {
        let electronic = order.shipment_mut(&"SHIP-E".into()).unwrap();
        electronic.mark_shipped(None, Utc::now()).unwrap();
    }
    order.refresh_progress();
    assert_eq!(order.status(), OrderStatus::PartiallyShipped);

    {
        let physical = order.shipment_mut(&"SHIP-P".into()).unwrap();
        physical.mark_released().unwrap();
        physical
            .mark_shipped(Some("TRK-1".into()), Utc::now())
            .unwrap();
    }
    order.refresh_progress();
    assert_eq!(order.status(), OrderStatus::Completed);

    // Terminal: no further cancellation.
    assert!(order.cancel().is_err());
}

#[test]
fn hold_blocks_nothing_after_release() {
    let mut order = two_shipment_order();
    order.hold().unwrap();
    assert_eq!(order.status(), OrderStatus::OnHold);
    order.release().unwrap();
    assert_eq!(order.status(), OrderStatus::InProgress);
}

#[test]
fn returnable_quantities_shrink_with_each_return() {
    let mut order = two_shipment_order();
    order.start_progress();

    let mut first = OrderReturn::new(
        ReturnId::new(),
        "RMA-1",
        order.id,
        "SHIP-P",
        OrderReturnType::Return,
        vec![OrderReturnSku::new("SKU-001", 1, Money::from_cents(1500))],
        Actor::CmUser("u1".into()),
        Utc::now(),
    );
    first.update_returnable_quantities(&order, &[]);
    assert_eq!(first.skus[0].returnable_quantity, 2);
    first.complete().unwrap();
    order.add_return(first.id);

    let mut second = OrderReturn::new(
        ReturnId::new(),
        "RMA-2",
        order.id,
        "SHIP-P",
        OrderReturnType::Return,
        vec![OrderReturnSku::new("SKU-001", 2, Money::from_cents(1500))],
        Actor::CmUser("u1".into()),
        Utc::now(),
    );
    second.update_returnable_quantities(&order, &[first]);
    assert_eq!(second.skus[0].returnable_quantity, 1);
}
