use anyhow::Result;
use uuid::Uuid;

use user_service::{
    clients::password::Argon2Hasher,
    models::user::{User, UserError},
    usecases::ports::{PasswordHasher, RepositoryError},
};

use crate::support::FakeHasher;

/// Test: New users are validated field by field
#[test]
fn test_new_user_validation() {
    let cases = [
        ("test@example.com", "Test User", "password123", None),
        ("", "Test User", "password123", Some("invalid email address")),
        ("test@example.com", "", "password123", Some("invalid name")),
        (
            "test@example.com",
            "Test User",
            "pass",
            Some("password must be at least 8 characters"),
        ),
    ];

    for (email, name, password, expected_error) in cases {
        let result = User::new(email, name, password, &FakeHasher);

        match expected_error {
            None => {
                let user = result.expect("valid input should build a user");
                assert_eq!(user.email, email);
                assert_eq!(user.name, name);
                assert_eq!(user.id, Uuid::nil());
                assert_ne!(user.password_hash, password);
                assert_eq!(user.created_at, user.updated_at);
            }
            Some(message) => {
                let err = result.expect_err("invalid input should be rejected");
                assert_eq!(err.to_string(), message);
            }
        }
    }
}

/// Test: Password hashes are never serialized
#[test]
fn test_password_hash_not_serialized() -> Result<()> {
    let user = User::new("test@example.com", "Test", "password123", &FakeHasher)?;
    let json = serde_json::to_value(&user)?;

    assert!(json.get("password_hash").is_none());
    assert_eq!(json["email"], "test@example.com");

    Ok(())
}

/// Test: Profile updates reject empty names and bump updated_at
#[test]
fn test_update_profile() -> Result<()> {
    let mut user = User::new("test@example.com", "Before", "password123", &FakeHasher)?;
    let created_at = user.created_at;

    assert!(matches!(user.update_profile(""), Err(UserError::InvalidName)));
    assert_eq!(user.name, "Before");

    user.update_profile("After")?;
    assert_eq!(user.name, "After");
    assert!(user.updated_at >= created_at);
    assert_eq!(user.created_at, created_at);

    Ok(())
}

/// Test: Argon2 hashes verify the right password only
#[test]
fn test_argon2_password_check() -> Result<()> {
    let hasher = Argon2Hasher;
    let user = User::new("test@example.com", "Test", "password123", &hasher)?;

    assert!(user.password_hash.starts_with("$argon2"));
    assert!(user.check_password("password123", &hasher));
    assert!(!user.check_password("wrongpassword", &hasher));
    assert!(!hasher.verify("password123", "not-a-phc-string"));

    Ok(())
}

/// Test: Repository errors map onto user errors
#[test]
fn test_repository_error_mapping() {
    assert!(matches!(
        UserError::from(RepositoryError::NotFound),
        UserError::NotFound
    ));
    assert!(matches!(
        UserError::from(RepositoryError::Conflict),
        UserError::AlreadyExists
    ));
    assert!(matches!(
        UserError::from(RepositoryError::Backend("boom".to_string())),
        UserError::Repository(_)
    ));
}
