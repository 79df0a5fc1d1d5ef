pub mod zb;
