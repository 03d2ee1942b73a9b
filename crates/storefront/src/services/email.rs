//! Transactional email.
//!
//! Uses SMTP via lettre with Askama templates, sending a plain-text and an
//! HTML part for every message. Without SMTP settings the service logs each
//! message and drops it, which keeps local development working.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::models::{ContactMessage, OrderDetail, User};
use crate::services::auth::OtpPurpose;

// =============================================================================
// Templates
// =============================================================================

#[derive(Template)]
#[template(path = "email/otp.html")]
struct OtpEmailHtml<'a> {
    name: &'a str,
    heading: &'a str,
    code: &'a str,
    minutes: u64,
}

#[derive(Template)]
#[template(path = "email/otp.txt")]
struct OtpEmailText<'a> {
    name: &'a str,
    heading: &'a str,
    code: &'a str,
    minutes: u64,
}

/// A pre-formatted order line for the confirmation templates.
struct ItemLine {
    name: String,
    quantity: u32,
    total: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_number: &'a str,
    items: &'a [ItemLine],
    subtotal: String,
    has_discount: bool,
    discount: String,
    shipping: String,
    total: String,
    payment_method: &'a str,
    address: &'a str,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_number: &'a str,
    items: &'a [ItemLine],
    subtotal: String,
    has_discount: bool,
    discount: String,
    shipping: String,
    total: String,
    payment_method: &'a str,
    address: &'a str,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.html")]
struct OrderStatusHtml<'a> {
    name: &'a str,
    order_number: &'a str,
    status: &'a str,
    awb_code: Option<&'a str>,
    courier_name: Option<&'a str>,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.txt")]
struct OrderStatusText<'a> {
    name: &'a str,
    order_number: &'a str,
    status: &'a str,
    awb_code: Option<&'a str>,
    courier_name: Option<&'a str>,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/contact_notification.html")]
struct ContactNotificationHtml<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    subject: &'a str,
    message: &'a str,
}

#[derive(Template)]
#[template(path = "email/contact_notification.txt")]
struct ContactNotificationText<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    subject: &'a str,
    message: &'a str,
}

// =============================================================================
// Service
// =============================================================================

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    /// Create an email service; `None` config gives a log-only service.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: Option<&EmailConfig>, base_url: &str) -> Result<Self, SmtpError> {
        let Some(config) = config else {
            return Ok(Self::log_only(base_url));
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer: Some(mailer),
            from_address: config.from_address.clone(),
            base_url: base_url.to_owned(),
        })
    }

    /// A service that only logs.
    #[must_use]
    pub fn log_only(base_url: &str) -> Self {
        Self {
            mailer: None,
            from_address: "Aurum <no-reply@localhost>".to_owned(),
            base_url: base_url.to_owned(),
        }
    }

    /// Send a one-time code.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_otp(
        &self,
        user: &User,
        purpose: OtpPurpose,
        code: &str,
        minutes: u64,
    ) -> Result<(), EmailError> {
        let heading = match purpose {
            OtpPurpose::Verify => "Verify your email address",
            OtpPurpose::ResetPassword => "Reset your password",
        };
        let name = user.name.as_str();
        let html = OtpEmailHtml { name, heading, code, minutes }.render()?;
        let text = OtpEmailText { name, heading, code, minutes }.render()?;

        self.send_multipart_email(user.email.as_str(), heading, &text, &html)
            .await
    }

    /// Send the order confirmation.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, detail: &OrderDetail) -> Result<(), EmailError> {
        let order = &detail.order;
        let items: Vec<ItemLine> = detail
            .items
            .iter()
            .map(|i| ItemLine {
                name: i.name.clone(),
                quantity: i.quantity,
                total: (i.unit_price * i.quantity).saturating_sub(i.discount).to_string(),
            })
            .collect();
        let discount = order.offer_discount + order.coupon_discount;
        let shipping = order.shipping + order.cod_charge;
        let address = &order.shipping_address;
        let address = format!(
            "{}, {}, {} {}",
            address.line1, address.city, address.state, address.pincode
        );
        let order_url = self.order_url(order.id.as_i32());
        let name = address_name(detail);
        let payment_method = order.payment_method.as_str();

        let html = OrderConfirmationHtml {
            name,
            order_number: &order.order_number,
            items: &items,
            subtotal: order.subtotal.to_string(),
            has_discount: !discount.is_zero(),
            discount: discount.to_string(),
            shipping: shipping.to_string(),
            total: order.total.to_string(),
            payment_method,
            address: &address,
            order_url: &order_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            name,
            order_number: &order.order_number,
            items: &items,
            subtotal: order.subtotal.to_string(),
            has_discount: !discount.is_zero(),
            discount: discount.to_string(),
            shipping: shipping.to_string(),
            total: order.total.to_string(),
            payment_method,
            address: &address,
            order_url: &order_url,
        }
        .render()?;

        let subject = format!("Order {} confirmed", order.order_number);
        self.send_multipart_email(&order.shipping_address.email, &subject, &text, &html)
            .await
    }

    /// Tell the customer their order moved to a new status.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_status(&self, detail: &OrderDetail) -> Result<(), EmailError> {
        let order = &detail.order;
        let status = order.status.as_str().replace('_', " ");
        let order_url = self.order_url(order.id.as_i32());
        let name = address_name(detail);

        let html = OrderStatusHtml {
            name,
            order_number: &order.order_number,
            status: &status,
            awb_code: order.awb_code.as_deref(),
            courier_name: order.courier_name.as_deref(),
            order_url: &order_url,
        }
        .render()?;
        let text = OrderStatusText {
            name,
            order_number: &order.order_number,
            status: &status,
            awb_code: order.awb_code.as_deref(),
            courier_name: order.courier_name.as_deref(),
            order_url: &order_url,
        }
        .render()?;

        let subject = format!("Order {} is {status}", order.order_number);
        self.send_multipart_email(&order.shipping_address.email, &subject, &text, &html)
            .await
    }

    /// Forward a contact form submission to the store inbox.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_contact_notification(
        &self,
        to: &str,
        contact: &ContactMessage,
    ) -> Result<(), EmailError> {
        let phone = contact.phone.as_ref().map(aurum_core::Phone::as_str);
        let html = ContactNotificationHtml {
            name: &contact.name,
            email: contact.email.as_str(),
            phone,
            subject: &contact.subject,
            message: &contact.message,
        }
        .render()?;
        let text = ContactNotificationText {
            name: &contact.name,
            email: contact.email.as_str(),
            phone,
            subject: &contact.subject,
            message: &contact.message,
        }
        .render()?;

        let subject = format!("[Contact] {}", contact.subject);
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    fn order_url(&self, order_id: i32) -> String {
        format!("{}/order/{order_id}", self.base_url)
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(mailer) = &self.mailer else {
            tracing::info!(to = %to, subject = %subject, body = %text_body, "SMTP not configured, email logged only");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn address_name(detail: &OrderDetail) -> &str {
    detail.order.shipping_address.full_name.as_str()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_templates_render_code() {
        let html = OtpEmailHtml {
            name: "Asha",
            heading: "Verify your email address",
            code: "123456",
            minutes: 10,
        }
        .render()
        .unwrap();
        assert!(html.contains("123456"));
        assert!(html.contains("10 minutes"));

        let text = OtpEmailText {
            name: "Asha",
            heading: "Reset your password",
            code: "654321",
            minutes: 10,
        }
        .render()
        .unwrap();
        assert!(text.starts_with("Hi Asha,"));
        assert!(text.contains("654321"));
    }

    #[test]
    fn test_contact_html_escapes_message() {
        let html = ContactNotificationHtml {
            name: "Ravi",
            email: "ravi@example.com",
            phone: None,
            subject: "Hello",
            message: "<script>alert(1)</script>",
        }
        .render()
        .unwrap();
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn test_log_only_service_accepts_mail() {
        let service = EmailService::log_only("http://localhost:3000");
        service
            .send_multipart_email("someone@example.com", "Hi", "text", "<p>html</p>")
            .await
            .unwrap();
    }
}
