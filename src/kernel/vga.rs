//! VGA text-mode terminal over the 0xB8000 framebuffer, scrolled a line at
//! a time. Used for on-screen diagnostics alongside the serial sink.

use core::fmt;
use core::ptr;

use spin::Mutex;

const VGA_BUFFER: usize = 0xB8000;
const WIDTH: usize = 80;
const HEIGHT: usize = 25;
const DEFAULT_ATTR: u8 = 0x07; // light gray on black

pub struct Writer {
    col: usize,
    row: usize,
}

impl Writer {
    const fn new() -> Self {
        Writer { col: 0, row: 0 }
    }

    fn cell(offset: usize) -> *mut u8 {
        (VGA_BUFFER + offset) as *mut u8
    }

    pub fn clear(&mut self) {
        for i in 0..(WIDTH * HEIGHT) {
            unsafe {
                ptr::write_volatile(Self::cell(i * 2), b' ');
                ptr::write_volatile(Self::cell(i * 2 + 1), DEFAULT_ATTR);
            }
        }
        self.col = 0;
        self.row = 0;
    }

    fn newline(&mut self) {
        self.col = 0;
        self.row += 1;
        if self.row >= HEIGHT {
            self.scroll();
            self.row = HEIGHT - 1;
        }
    }

    fn scroll(&mut self) {
        for y in 1..HEIGHT {
            for x in 0..WIDTH {
                let src = (y * WIDTH + x) * 2;
                let dst = ((y - 1) * WIDTH + x) * 2;
                unsafe {
                    let ch = ptr::read_volatile(Self::cell(src));
                    let attr = ptr::read_volatile(Self::cell(src + 1));
                    ptr::write_volatile(Self::cell(dst), ch);
                    ptr::write_volatile(Self::cell(dst + 1), attr);
                }
            }
        }
        for x in 0..WIDTH {
            let offset = ((HEIGHT - 1) * WIDTH + x) * 2;
            unsafe {
                ptr::write_volatile(Self::cell(offset), b' ');
                ptr::write_volatile(Self::cell(offset + 1), DEFAULT_ATTR);
            }
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        if byte == b'\n' {
            self.newline();
            return;
        }

        let offset = (self.row * WIDTH + self.col) * 2;
        unsafe {
            ptr::write_volatile(Self::cell(offset), byte);
            ptr::write_volatile(Self::cell(offset + 1), DEFAULT_ATTR);
        }

        self.col += 1;
        if self.col >= WIDTH {
            self.newline();
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

lazy_static::lazy_static! {
    pub static ref TERMINAL: Mutex<Writer> = Mutex::new(Writer::new());
}
