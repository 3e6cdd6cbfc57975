use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 2, message = "name needs at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(
        min = 6,
        message = "password needs at least 6 characters"
    ))]
    pub password: String,
    #[validate(must_match(other = "password", message = "passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResetForm {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangePasswordForm {
    #[validate(length(min = 1, message = "current password is required"))]
    pub current_password: String,
    #[validate(length(
        min = 6,
        message = "password needs at least 6 characters"
    ))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "passwords do not match"))]
    pub confirm_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn login_requires_email_and_password() {
        let ok = LoginForm {
            email: "ops@example.com".to_string(),
            password: "secret".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = LoginForm {
            email: "not-an-email".to_string(),
            password: String::new(),
        };
        let err = AppError::from(bad.validate().unwrap_err());
        let fields: Vec<String> = err.field_messages().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["email".to_string(), "password".to_string()]);
    }

    #[test]
    fn register_checks_confirmation() {
        let form = RegisterForm {
            name: "Ops".to_string(),
            email: "ops@example.com".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret2".to_string(),
        };
        let err = AppError::from(form.validate().unwrap_err());
        assert_eq!(
            err.field_messages(),
            vec![(
                "confirm_password".to_string(),
                "passwords do not match".to_string()
            )]
        );
    }

    #[test]
    fn register_enforces_lengths() {
        let form = RegisterForm {
            name: "O".to_string(),
            email: "ops@example.com".to_string(),
            password: "12345".to_string(),
            confirm_password: "12345".to_string(),
        };
        let err = AppError::from(form.validate().unwrap_err());
        let fields: Vec<String> = err.field_messages().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["name".to_string(), "password".to_string()]);
    }

    #[test]
    fn change_password_requires_current() {
        let form = ChangePasswordForm {
            current_password: String::new(),
            new_password: "newsecret".to_string(),
            confirm_password: "newsecret".to_string(),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn reset_requires_email() {
        assert!(ResetForm {
            email: "x".to_string()
        }
        .validate()
        .is_err());
    }
}
