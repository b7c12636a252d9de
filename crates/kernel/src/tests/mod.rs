mod support;

mod ipc;
mod lifecycle;
