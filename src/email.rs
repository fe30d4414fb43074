use crate::AppMode;
use resend_rs::types::CreateEmailBaseOptions;
use resend_rs::Resend;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Unknown Email error")]
    UnknownError,
    #[error("Resend API key not found")]
    ApiKeyNotFound,
}

pub async fn send_welcome_email(
    app_mode: AppMode,
    resend_api_key: Option<String>,
    to_email: String,
) -> Result<(), EmailError> {
    tracing::debug!("Entering send_welcome_email");
    let api_key = resend_api_key.ok_or(EmailError::ApiKeyNotFound)?;

    let resend = Resend::new(&api_key);

    let from = from_memora_email(app_mode);
    let to = [to_email];
    let subject = "Welcome to Memora";

    let html_content = r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>Welcome to Memora</title>
            <style>
                body { font-family: ui-sans-serif,system-ui,sans-serif; }
                .container { max-width: 600px; margin: 0 auto; padding: 20px; }
                h1, h2, h3 { font-weight: 300; }
            </style>
        </head>
        <body>
            <div class="container">
                <h1>Welcome to Memora!</h1>
                <p>Your account is ready. Create your first project, upload a gallery, and share it with your clients in minutes.</p>
                <p>Best regards,<br>The Memora Team</p>
            </div>
        </body>
        </html>
        "#
    .to_string();

    let email = CreateEmailBaseOptions::new(from, to, subject).with_html(&html_content);

    let _email = resend.emails.send(email).await.map_err(|e| {
        tracing::error!("Failed to send email: {}", e);
        EmailError::UnknownError
    });

    tracing::debug!("Exiting send_welcome_email");
    Ok(())
}

pub async fn send_guest_invite_email(
    app_mode: AppMode,
    resend_api_key: Option<String>,
    to_email: String,
    phase_name: String,
    phase_uuid: Uuid,
    guest_token: String,
) -> Result<(), EmailError> {
    tracing::debug!("Entering send_guest_invite_email");
    let api_key = resend_api_key.ok_or(EmailError::ApiKeyNotFound)?;

    let resend = Resend::new(&api_key);

    let from = from_memora_email(app_mode.clone());
    let to = [to_email];
    let subject = format!("Your photos are ready: {}", phase_name);

    let gallery_url = format!(
        "{}/gallery/{}?guest_token={}",
        app_mode.frontend_url(),
        phase_uuid,
        guest_token
    );

    let html_content = format!(
        r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>Your photos are ready</title>
            <style>
                body {{ font-family: ui-sans-serif,system-ui,sans-serif; }}
                .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
                h1, h2, h3 {{ font-weight: 300; }}
                .button {{ display: inline-block; padding: 10px 20px; background-color: black; color: #ffffff; text-decoration: none; border-radius: 5px; }}
            </style>
        </head>
        <body>
            <div class="container">
                <h1>Your photos are ready!</h1>
                <p>Your photographer has shared <strong>{}</strong> with you. Click below to view the gallery and make your picks:</p>
                <p>
                    <a href="{}" class="button">Open Gallery</a>
                </p>
                <p>If the button doesn't work, you can copy and paste the following link into your browser:</p>
                <p>{}</p>
                <p>This link will expire in 7 days.</p>
                <p>If you weren't expecting this email, you can safely ignore it.</p>
                <p>Best regards,<br>The Memora Team</p>
            </div>
        </body>
        </html>
        "#,
        phase_name, gallery_url, gallery_url
    );

    let email = CreateEmailBaseOptions::new(from, to, subject).with_html(&html_content);

    let _email = resend.emails.send(email).await.map_err(|e| {
        tracing::error!("Failed to send email: {}", e);
        EmailError::UnknownError
    });

    tracing::debug!("Exiting send_guest_invite_email");
    Ok(())
}

pub async fn send_phase_completed_email(
    app_mode: AppMode,
    resend_api_key: Option<String>,
    to_email: String,
    phase_name: String,
    selected_count: usize,
) -> Result<(), EmailError> {
    tracing::debug!("Entering send_phase_completed_email");
    let api_key = resend_api_key.ok_or(EmailError::ApiKeyNotFound)?;

    let resend = Resend::new(&api_key);

    let from = from_memora_email(app_mode);
    let to = [to_email];
    let subject = format!("Selections complete: {}", phase_name);

    let html_content = format!(
        r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>Selections complete</title>
            <style>
                body {{ font-family: ui-sans-serif,system-ui,sans-serif; }}
                .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
                h1, h2, h3 {{ font-weight: 300; }}
            </style>
        </head>
        <body>
            <div class="container">
                <h1>Your client just finished picking</h1>
                <p><strong>{}</strong> is complete with {} photos selected.</p>
                <p>Log in to your dashboard to review the picks and start editing.</p>
                <p>Best regards,<br>The Memora Team</p>
            </div>
        </body>
        </html>
        "#,
        phase_name, selected_count
    );

    let email = CreateEmailBaseOptions::new(from, to, subject).with_html(&html_content);

    let _email = resend.emails.send(email).await.map_err(|e| {
        tracing::error!("Failed to send email: {}", e);
        EmailError::UnknownError
    });

    tracing::debug!("Exiting send_phase_completed_email");
    Ok(())
}

pub async fn send_subscription_active_email(
    app_mode: AppMode,
    resend_api_key: Option<String>,
    to_email: String,
    tier: String,
    billing_cycle: String,
) -> Result<(), EmailError> {
    tracing::debug!("Entering send_subscription_active_email");
    let api_key = resend_api_key.ok_or(EmailError::ApiKeyNotFound)?;

    let resend = Resend::new(&api_key);

    let from = from_memora_email(app_mode);
    let to = [to_email];
    let subject = "Your Memora subscription is active";

    let html_content = format!(
        r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>Subscription active</title>
            <style>
                body {{ font-family: ui-sans-serif,system-ui,sans-serif; }}
                .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
                h1, h2, h3 {{ font-weight: 300; }}
            </style>
        </head>
        <body>
            <div class="container">
                <h1>Welcome aboard!</h1>
                <p>Your <strong>{}</strong> plan ({}) is now active. Thank you for supporting Memora.</p>
                <p>If anything about this charge looks wrong, reply to this email and we'll sort it out.</p>
                <p>Best regards,<br>The Memora Team</p>
            </div>
        </body>
        </html>
        "#,
        tier, billing_cycle
    );

    let email = CreateEmailBaseOptions::new(from, to, subject).with_html(&html_content);

    let _email = resend.emails.send(email).await.map_err(|e| {
        tracing::error!("Failed to send email: {}", e);
        EmailError::UnknownError
    });

    tracing::debug!("Exiting send_subscription_active_email");
    Ok(())
}

fn from_memora_email(app_mode: AppMode) -> String {
    match app_mode {
        AppMode::Local => "local@mail.memora.app".to_string(),
        AppMode::Dev => "dev@mail.memora.app".to_string(),
        AppMode::Prod => "hello@mail.memora.app".to_string(),
        AppMode::Custom(_) => "dev@mail.memora.app".to_string(),
    }
}
