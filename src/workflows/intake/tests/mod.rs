mod common;

mod page;
mod review;
