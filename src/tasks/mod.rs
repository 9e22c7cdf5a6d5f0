pub mod poll_ender;
