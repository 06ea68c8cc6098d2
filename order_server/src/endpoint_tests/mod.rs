mod access;
mod admin;
mod helpers;
mod mocks;
mod order_lifecycle;
