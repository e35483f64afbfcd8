pub mod http;
pub mod nowpayments;
pub mod paystack;
