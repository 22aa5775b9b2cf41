//! User lifecycle: registration, activation, login and password reset.
//!
//! ## Key Responsibilities
//! - Register users inactive and gate activation behind an emailed OTP
//! - Issue and verify login tokens
//! - Run the password-reset code flow
//!
//! ## Business Rules
//! - One live OTP per email; issuing a new code deletes the old one
//! - Expired codes are flagged lazily, at the moment verification sees them
//! - The registration code is sent synchronously: if the email cannot go
//!   out, registration fails. Resend and reset codes go out in the
//!   background and never block the response.

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::auth;
use crate::config::Config;
use crate::domain::ledger;
use crate::domain::models::{
    ConfirmRegistrationRequest, LoginForm, LoginResponse, PasswordResetConfirmRequest,
    PasswordResetRequest, RegisterRequest, Role, User,
};
use crate::email::{title_case, Mailer};
use crate::errors::{ApiError, ApiResult};
use crate::storage::otps::{NewOtp, OtpRepository};
use crate::storage::users::{NewUser, UserChanges, UserFilter, UserRepository};
use crate::storage::Db;

/// Service for the user account lifecycle
#[derive(Clone)]
pub struct UserService {
    users: UserRepository,
    otps: OtpRepository,
    mailer: Mailer,
    config: Config,
}

impl UserService {
    pub fn new(db: Db, mailer: Mailer, config: Config) -> Self {
        Self {
            users: UserRepository::new(db.clone()),
            otps: OtpRepository::new(db),
            mailer,
            config,
        }
    }

    /// Create an inactive user and email the activation code. This send is
    /// waited on; a delivery failure fails the whole registration so the
    /// client knows to retry.
    pub async fn register(&self, req: RegisterRequest) -> ApiResult<String> {
        info!("registering user {}", req.email);

        if req.password != req.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }

        let taken = self
            .users
            .exists(&UserFilter {
                email: Some(req.email.clone()),
                ..Default::default()
            })
            .await?;
        if taken {
            return Err(ApiError::Validation(
                "A user with this email already exists! If this is your account, request an OTP to activate your account"
                    .to_string(),
            ));
        }

        let hashed_password = auth::hash_password(req.password).await?;
        let user = self
            .users
            .create(NewUser {
                email: req.email,
                first_name: req.first_name,
                last_name: req.last_name,
                phone_number: req.phone_number,
                date_of_birth: req.date_of_birth,
                address: req.address,
                role: Role::Customer,
                is_active: false,
                hashed_password,
            })
            .await?;

        let code = self
            .issue_otp(&user.email, self.config.otp_lifespan_minutes)
            .await?;

        if let Err(err) = self
            .mailer
            .send_verification_code(&user.email, &title_case(&user.first_name), &code)
            .await
        {
            error!("failed to send registration otp: {err:#}");
            return Err(ApiError::Unexpected(
                "Failed to send verification email".to_string(),
            ));
        }

        info!("registered user {} (inactive, awaiting otp)", user.id);
        Ok(format!(
            "Registration successful for {}. Check your email for OTP to activate your account.",
            user.email
        ))
    }

    /// Verify credentials and return a bearer token. Unknown email and wrong
    /// password produce the same error so the response does not reveal which
    /// half was wrong.
    pub async fn login(&self, form: LoginForm) -> ApiResult<LoginResponse> {
        info!("login attempt for {}", form.username);

        let user = self
            .users
            .find_one(&UserFilter {
                email: Some(form.username),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| ApiError::Validation("Incorrect email or password".to_string()))?;

        let verified = auth::verify_password(form.password, user.hashed_password.clone()).await?;
        if !verified {
            return Err(ApiError::Validation(
                "Incorrect email or password".to_string(),
            ));
        }

        if !user.is_active {
            return Err(ApiError::Validation(
                "User not active. Please request an OTP and activate your account.".to_string(),
            ));
        }

        let access_token = auth::create_token(&user.id, &self.config)?;
        Ok(LoginResponse {
            access_token,
            token_type: "bearer".to_string(),
        })
    }

    /// Match the submitted code against the live OTP and activate the user.
    /// The welcome email is best-effort.
    pub async fn confirm_registration(&self, req: ConfirmRegistrationRequest) -> ApiResult<String> {
        let user = self
            .users
            .find_one(&UserFilter {
                email: Some(req.email.clone()),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| ApiError::Validation("User does not exist or wrong email".to_string()))?;

        let otp = self
            .otps
            .find_by_email(&req.email)
            .await?
            .ok_or_else(|| {
                ApiError::Validation("OTP not found. Please request a new OTP.".to_string())
            })?;

        if otp.is_expired || otp.expires_on < Utc::now() {
            self.otps.expire_all_for_email(&req.email).await?;
            return Err(ApiError::Validation(
                "OTP has expired. Please request a new OTP.".to_string(),
            ));
        }
        if otp.otp_code != req.otp_code {
            return Err(ApiError::Validation("Incorrect OTP code.".to_string()));
        }

        self.otps.delete(&otp.id).await?;
        let user = self
            .users
            .update(
                &user.id,
                &UserChanges {
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        if let Err(err) = self
            .mailer
            .send_welcome(
                &user.email,
                &title_case(&user.first_name),
                &title_case(&user.last_name),
                role_label(user.role),
                user.created_at,
            )
            .await
        {
            warn!("failed to send welcome email: {err:#}");
        }

        info!("user {} activated", user.id);
        Ok("Account successfully activated. Please proceed to login!".to_string())
    }

    /// Issue a fresh activation code, superseding any live one, and email it
    /// in the background.
    pub async fn send_otp(&self, email: &str) -> ApiResult<String> {
        let user = self
            .users
            .find_one(&UserFilter {
                email: Some(email.to_string()),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| {
                ApiError::Validation("User does not exist. Please register first.".to_string())
            })?;

        let code = self
            .issue_otp(&user.email, self.config.otp_lifespan_minutes)
            .await?;

        let mailer = self.mailer.clone();
        let recipient = user.email.clone();
        let name = title_case(&user.first_name);
        tokio::spawn(async move {
            if let Err(err) = mailer.send_verification_code(&recipient, &name, &code).await {
                error!("failed to send otp email: {err:#}");
            }
        });

        Ok("OTP sent. Check your email to activate your account.".to_string())
    }

    /// Issue a reset code if the email is registered. The response is the
    /// same either way so the endpoint cannot be used to probe for accounts.
    pub async fn request_password_reset(&self, req: PasswordResetRequest) -> ApiResult<String> {
        const DETAIL: &str = "A password reset code has been sent to your email.";

        let Some(user) = self
            .users
            .find_one(&UserFilter {
                email: Some(req.email),
                ..Default::default()
            })
            .await?
        else {
            return Ok(DETAIL.to_string());
        };

        let code = self
            .issue_otp(&user.email, self.config.reset_otp_lifespan_minutes)
            .await?;

        let mailer = self.mailer.clone();
        let recipient = user.email.clone();
        tokio::spawn(async move {
            if let Err(err) = mailer.send_password_reset_code(&recipient, &code).await {
                error!("failed to send password reset email: {err:#}");
            }
        });

        Ok(DETAIL.to_string())
    }

    /// Verify the reset code and replace the password. Consumes the code.
    pub async fn confirm_password_reset(
        &self,
        req: PasswordResetConfirmRequest,
    ) -> ApiResult<String> {
        if req.new_password != req.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }

        let user = self
            .users
            .find_one(&UserFilter {
                email: Some(req.email.clone()),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| ApiError::Validation("User does not exist".to_string()))?;

        let otp = self.otps.find_by_email(&req.email).await?.ok_or_else(|| {
            ApiError::Validation("Reset code not found. Please request a new one.".to_string())
        })?;

        if otp.is_expired || otp.expires_on < Utc::now() {
            self.otps.expire_all_for_email(&req.email).await?;
            return Err(ApiError::Validation(
                "Reset code has expired. Please request a new one.".to_string(),
            ));
        }
        if otp.otp_code != req.reset_code {
            return Err(ApiError::Validation("Incorrect reset code.".to_string()));
        }

        let hashed_password = auth::hash_password(req.new_password).await?;
        self.users
            .update(
                &user.id,
                &UserChanges {
                    hashed_password: Some(hashed_password),
                    ..Default::default()
                },
            )
            .await?;
        self.otps.delete(&otp.id).await?;

        info!("password reset completed for user {}", user.id);
        Ok("Password successfully reset. You can now login with your new password.".to_string())
    }

    /// Lookup by id for the auth extractor; an unknown id is simply `None`.
    pub async fn get_user(&self, id: &str) -> ApiResult<Option<User>> {
        self.users.get(id).await
    }

    /// Deletes any live code for the email, then stores a fresh one.
    async fn issue_otp(&self, email: &str, lifespan_minutes: i64) -> ApiResult<String> {
        self.otps.delete_by_email(email).await?;
        let code = ledger::generate_otp_code();
        self.otps
            .create(NewOtp {
                email: email.to_string(),
                otp_code: code.clone(),
                expires_on: Utc::now() + Duration::minutes(lifespan_minutes),
            })
            .await?;
        info!("otp issued for {email}");
        Ok(code)
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Customer => "CUSTOMER",
        Role::Admin => "ADMIN",
    }
}
