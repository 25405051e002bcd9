//! # GPIO Character Device
//!
//! Digital lines requested through the line-handle interface of `/dev/gpiochipN`.
//! Every requested line is represented by its own file descriptor, which releases
//! the line when it is closed.
use nix::ioctl_readwrite;
use std::{
    ffi::{c_char, c_int},
    fs::{File, OpenOptions},
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    path::{Path, PathBuf},
};

const GPIOHANDLES_MAX: usize = 64;
const GPIO_CONSUMER_LEN: usize = 32;

const GPIOHANDLE_REQUEST_INPUT: u32 = 1 << 0;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;

/// Defined in linux/gpio.h
#[repr(C)]
struct GpioHandleRequest {
    line_offsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [c_char; GPIO_CONSUMER_LEN],
    lines: u32,
    fd: c_int,
}

#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

const GPIO_IOC_MAGIC: u8 = 0xB4;

ioctl_readwrite!(gpio_get_linehandle, GPIO_IOC_MAGIC, 0x03, GpioHandleRequest);
ioctl_readwrite!(gpiohandle_get_line_values, GPIO_IOC_MAGIC, 0x08, GpioHandleData);
ioctl_readwrite!(gpiohandle_set_line_values, GPIO_IOC_MAGIC, 0x09, GpioHandleData);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Input,
    /// Output, driven low after the request
    Output,
}

fn consumer_label(consumer: &str) -> [c_char; GPIO_CONSUMER_LEN] {
    // The last byte stays 0 as terminator
    let mut label = [0; GPIO_CONSUMER_LEN];
    for (dst, src) in label
        .iter_mut()
        .zip(consumer.bytes().take(GPIO_CONSUMER_LEN - 1))
    {
        *dst = src as c_char;
    }
    label
}

/// An open GPIO chip.
#[derive(Debug)]
pub struct GpioChip {
    file: File,
    path: PathBuf,
}

impl GpioChip {
    pub fn open(path: impl AsRef<Path>) -> io::Result<GpioChip> {
        let path = path.as_ref();
        log::debug!("Opening GPIO chip: {}", path.display());
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(GpioChip {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request exclusive use of a single line.
    pub fn request_line(
        &self,
        offset: u32,
        direction: Direction,
        consumer: &str,
    ) -> io::Result<GpioLine> {
        let mut request = GpioHandleRequest {
            line_offsets: [0; GPIOHANDLES_MAX],
            flags: match direction {
                Direction::Input => GPIOHANDLE_REQUEST_INPUT,
                Direction::Output => GPIOHANDLE_REQUEST_OUTPUT,
            },
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: consumer_label(consumer),
            lines: 1,
            fd: -1,
        };
        request.line_offsets[0] = offset;

        // SAFETY: The ioctl call is safe because:
        // - File descriptor is valid (self.file is open)
        // - request has the layout the kernel expects
        unsafe {
            gpio_get_linehandle(self.file.as_raw_fd(), &mut request)?;
        }
        // SAFETY: On success, the kernel stored a freshly opened descriptor that nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(request.fd) };
        log::debug!(
            "Requested line {} of {} as {:?}",
            offset,
            self.path.display(),
            direction
        );
        Ok(GpioLine { fd })
    }
}

/// A single requested line. The line is released when this is dropped.
#[derive(Debug)]
pub struct GpioLine {
    fd: OwnedFd,
}

impl GpioLine {
    pub fn value(&self) -> io::Result<bool> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        // SAFETY: The descriptor is a line handle and data is valid for the duration of the call.
        unsafe {
            gpiohandle_get_line_values(self.fd.as_raw_fd(), &mut data)?;
        }
        Ok(data.values[0] != 0)
    }

    /// Fails for lines that were requested as input.
    pub fn set_value(&self, value: bool) -> io::Result<()> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        data.values[0] = value as u8;
        // SAFETY: The descriptor is a line handle and data is valid for the duration of the call.
        unsafe {
            gpiohandle_set_line_values(self.fd.as_raw_fd(), &mut data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{GpioHandleData, GpioHandleRequest, consumer_label};
    use std::{ffi::c_char, mem::size_of};

    #[test]
    fn request_layout_matches_kernel() {
        assert_eq!(size_of::<GpioHandleRequest>(), 364);
        assert_eq!(size_of::<GpioHandleData>(), 64);
    }

    #[test]
    fn consumer_label_is_terminated() {
        let label = consumer_label("modbus-io");
        let expected = "modbus-io".bytes().map(|b| b as c_char).collect::<Vec<_>>();
        assert_eq!(&label[..9], &expected[..]);
        assert_eq!(label[9], 0);

        let long = consumer_label(&"x".repeat(40));
        assert_eq!(long[30], b'x' as c_char);
        assert_eq!(long[31], 0);
    }
}
