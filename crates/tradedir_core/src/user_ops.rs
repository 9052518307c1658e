//! User account mutations.

use crate::{
    db::{Database, TransactionOps},
    error::AppError,
    models::user::{CreateUserRequest, UpdateUserRequest, User},
    text::normalize_optional_nonempty,
};

fn required_field(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn validate_email(value: &str) -> Result<String, AppError> {
    let email = required_field("email", value)?;
    if !email.contains('@') {
        return Err(AppError::BadRequest(format!(
            "'{}' is not an email address",
            email
        )));
    }
    Ok(email)
}

/// Register a user.
///
/// # Errors
/// Returns [`AppError::BadRequest`] for invalid fields, [`AppError::Conflict`]
/// when the email is taken, or storage errors.
pub fn create_user(db: &Database, request: CreateUserRequest) -> Result<User, AppError> {
    let mut user = User::new(
        validate_email(&request.email)?,
        required_field("first_name", &request.first_name)?,
        required_field("last_name", &request.last_name)?,
    );
    user.telephone = normalize_optional_nonempty(request.telephone);
    db.users.create(&user)?;
    tracing::info!(user_id = %user.id, "User created");
    Ok(user)
}

/// Update profile fields of a live user.
///
/// # Errors
/// Returns [`AppError::NotFound`] for missing or deleted users,
/// [`AppError::BadRequest`] for invalid fields, [`AppError::Conflict`] when a
/// new email is taken, or storage errors.
pub fn update_user(db: &Database, id: &str, request: UpdateUserRequest) -> Result<User, AppError> {
    let email = request.email.as_deref().map(validate_email).transpose()?;
    let first_name = request
        .first_name
        .as_deref()
        .map(|value| required_field("first_name", value))
        .transpose()?;
    let last_name = request
        .last_name
        .as_deref()
        .map(|value| required_field("last_name", value))
        .transpose()?;

    let updated = db.users.update_with(id, |user| {
        if user.is_deleted() {
            return Err(AppError::NotFound);
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(first_name) = first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = last_name {
            user.last_name = last_name;
        }
        if request.telephone.is_some() {
            user.telephone = normalize_optional_nonempty(request.telephone);
        }
        Ok(())
    })?;
    updated.ok_or(AppError::NotFound)
}

/// Soft-delete a user together with the entities only it owns.
///
/// # Returns
/// Ids of entities soft-deleted along with the user.
///
/// # Errors
/// Returns [`AppError::NotFound`] for missing or already deleted users, or storage errors.
pub fn soft_delete_user(db: &Database, id: &str) -> Result<Vec<String>, AppError> {
    let removed = TransactionOps::soft_delete_user_cascade(db, id)?;
    tracing::info!(user_id = id, entities = removed.len(), "User soft-deleted");
    Ok(removed)
}
