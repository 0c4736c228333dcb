//! OTP Worker Service - Entry Point
//!
//! Background worker that delivers one-time passwords from the
//! `otp-requests` queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    otp_worker::run().await
}
