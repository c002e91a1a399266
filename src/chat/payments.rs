// src/chat/payments.rs
//! Simulated payments. No money moves.

use chrono::Utc;

use crate::models::{PaymentDetails, PaymentStatus};

/// Delay before the contact acknowledges a payment
pub const ACKNOWLEDGE_DELAY_MS: u64 = 1500;

/// Parse a payment amount. Only finite, strictly positive numbers pass.
pub fn parse_amount(amount: &str) -> Option<f64> {
    let value: f64 = amount.trim().parse().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

/// A completed payment with a `T<epoch ms>` transaction id
pub fn completed_payment(amount: &str, note: &str) -> PaymentDetails {
    PaymentDetails {
        amount: amount.trim().to_string(),
        note: note.trim().to_string(),
        status: PaymentStatus::Completed,
        transaction_id: format!("T{}", Utc::now().timestamp_millis()),
    }
}

pub fn acknowledgement(amount: &str) -> String {
    format!("Thanks for the payment of ₹{}! I've received it.", amount)
}
