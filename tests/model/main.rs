mod support;

mod emulation;
