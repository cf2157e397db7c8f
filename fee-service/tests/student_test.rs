mod common;

use common::{new_receipt, new_student, TestContext};
use fee_service::models::{FeeMonth, NewStudent, PaymentStatus, StudentInsert, StudentUpdate};
use serde_json::json;
use service_core::error::AppError;

#[tokio::test]
async fn add_student_normalizes_the_ledger() {
    let ctx = TestContext::new();

    let outcome = ctx
        .fees
        .add_student(
            None,
            new_student(
                "2nd",
                "11",
                json!({"Jan": {"status": "Partial", "paid": "40", "due": 60.9}, "Mar": "bogus"}),
            ),
        )
        .await
        .expect("Failed to add student");

    let StudentInsert::Created(student) = outcome else {
        panic!("Expected a new student");
    };
    assert_eq!(student.class_name, "2nd");
    assert_eq!(student.roll, "11");

    let jan = student.months.get(FeeMonth::Jan);
    assert_eq!(jan.status, PaymentStatus::Partial);
    assert_eq!(jan.paid, 40);
    assert_eq!(jan.due, 60);
    assert_eq!(student.months.get(FeeMonth::Mar).due, 0);
    assert_eq!(student.months.get(FeeMonth::Annual).status, PaymentStatus::Due);

    ctx.cleanup().await;
}

#[tokio::test]
async fn duplicate_class_and_roll_is_reported_not_failed() {
    let ctx = TestContext::new();

    let first = ctx
        .fees
        .add_student(None, new_student("4th", "9", json!({})))
        .await
        .unwrap();
    assert!(first.is_created());

    let second = ctx
        .fees
        .add_student(None, new_student("4th", "9", json!({"Jan": {"due": 5}})))
        .await
        .unwrap();
    assert_eq!(second, StudentInsert::AlreadyExists);

    let students = ctx.fees.list_students(None).await.unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].months.get(FeeMonth::Jan).due, 0);

    ctx.cleanup().await;
}

#[tokio::test]
async fn numeric_rolls_are_stored_as_text() {
    let ctx = TestContext::new();

    let student: NewStudent = serde_json::from_value(json!({
        "name": "Asha",
        "class": "UKG",
        "roll": 12
    }))
    .unwrap();
    ctx.fees.add_student(None, student).await.unwrap();

    let found = ctx.fees.get_student(None, "UKG", "12").await.unwrap();
    assert_eq!(found.name, "Asha");
    assert_eq!(found.father, None);

    ctx.cleanup().await;
}

#[tokio::test]
async fn blank_required_fields_fail_validation() {
    let ctx = TestContext::new();

    let mut student = new_student("1st", "1", json!({}));
    student.name = String::new();

    let result = ctx.fees.add_student(None, student).await;
    assert!(matches!(result, Err(AppError::ValidationError(_))));

    ctx.cleanup().await;
}

#[tokio::test]
async fn get_missing_student_is_not_found() {
    let ctx = TestContext::new();

    let result = ctx.fees.get_student(None, "9th", "404").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    ctx.cleanup().await;
}

#[tokio::test]
async fn update_merges_fields_and_recomputes_annual_charge() {
    let ctx = TestContext::new();

    ctx.fees
        .add_student(None, new_student("7th", "3", json!({"Jan": {"due": 100}})))
        .await
        .unwrap();

    let update: StudentUpdate = serde_json::from_value(json!({
        "name": "Renamed",
        "roll": 30,
        "months": {"Annual": {"status": "Paid", "paid": 750, "due": 0}}
    }))
    .unwrap();

    let updated = ctx
        .fees
        .update_student(None, "7th", "3", update)
        .await
        .expect("Failed to update student");

    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.roll, "30");
    assert_eq!(updated.father.as_deref(), Some("Parent"));
    assert_eq!(updated.annual_charge, 750);
    assert_eq!(updated.months.get(FeeMonth::Jan).due, 0);
    assert_eq!(updated.months.get(FeeMonth::Annual).status, PaymentStatus::Paid);

    let missing = ctx.fees.get_student(None, "7th", "3").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    ctx.cleanup().await;
}

#[tokio::test]
async fn update_onto_an_occupied_roll_conflicts() {
    let ctx = TestContext::new();

    ctx.fees
        .add_student(None, new_student("7th", "1", json!({})))
        .await
        .unwrap();
    ctx.fees
        .add_student(None, new_student("7th", "2", json!({})))
        .await
        .unwrap();

    let update = StudentUpdate {
        roll: Some("1".to_string()),
        ..Default::default()
    };
    let result = ctx.fees.update_student(None, "7th", "2", update).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let missing = ctx
        .fees
        .update_student(None, "7th", "99", StudentUpdate::default())
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    ctx.cleanup().await;
}

#[tokio::test]
async fn delete_student_removes_their_receipts() {
    let ctx = TestContext::new();

    ctx.fees
        .add_student(None, new_student("10th", "5", json!({})))
        .await
        .unwrap();
    ctx.fees
        .add_student(None, new_student("10th", "6", json!({})))
        .await
        .unwrap();
    ctx.fees
        .record_receipt(None, new_receipt("10th", "5", 100, "k-5"))
        .await
        .unwrap();
    ctx.fees
        .record_receipt(None, new_receipt("10th", "6", 100, "k-6"))
        .await
        .unwrap();

    ctx.fees
        .delete_student(None, "10th", "5")
        .await
        .expect("Failed to delete student");

    let students = ctx.fees.list_students(None).await.unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].roll, "6");

    let receipts = ctx.fees.receipt_history(None).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].roll, "6");

    let again = ctx.fees.delete_student(None, "10th", "5").await;
    assert!(matches!(again, Err(AppError::NotFound(_))));

    ctx.cleanup().await;
}
