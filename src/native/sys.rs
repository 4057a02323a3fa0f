// Raw FFI bindings to the greeting shim in `c/hello_shim.c`.
use std::os::raw::c_char;

unsafe extern "C" {
    pub fn hello_println(s: *const c_char);
}
