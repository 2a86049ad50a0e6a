use ledger_core::models::{Entity, EntityId, EntityType, MutationAction, Payment, PaymentType};
use ledger_core::services::LedgerStore;
use tempfile::tempdir;

fn payment() -> Entity {
    Entity::Payment(Payment {
        id: EntityId::new(),
        version: None,
        supplier_id: Some(EntityId::new()),
        amount: Some(1_250.0),
        payment_type: Some(PaymentType::Advance),
        payment_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 14),
        reference: Some("RCPT-0042".to_string()),
        notes: None,
    })
}

#[tokio::test]
async fn unsynced_mutation_survives_reopen() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("ledger.db");
    let entity = payment();

    {
        let store = LedgerStore::open_path(&path).unwrap();
        store
            .enqueue(EntityType::Payment, MutationAction::Create, &entity)
            .await
            .unwrap();
    }

    let reopened = LedgerStore::open_path(&path).unwrap();
    let pending = reopened.list_pending().await.unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, entity);
    assert_eq!(pending[0].action, MutationAction::Create);
    assert!(!pending[0].synced);
}

#[tokio::test]
async fn client_id_survives_reopen() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("ledger.db");

    let first = {
        let store = LedgerStore::open_path(&path).unwrap();
        ledger_core::identity::DeviceIdentity::load_or_create(&store)
            .await
            .unwrap()
    };
    let store = LedgerStore::open_path(&path).unwrap();
    let second = ledger_core::identity::DeviceIdentity::load_or_create(&store)
        .await
        .unwrap();

    assert_eq!(first, second);
}
