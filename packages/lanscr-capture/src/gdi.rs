//! GDI screen grabber (Windows).
//!
//! Blits the union virtual-screen rectangle into a top-down 32-bit DIB and
//! composites the hardware cursor at `ptScreenPos - hotspot`. GDI is slower
//! than the modern duplication APIs but needs no device setup, works over
//! RDP, and captures layered windows via `CAPTUREBLT`.

use lanscr_core::capture::Bitmap;
use lanscr_core::{Error, Result, ScreenGrabber};

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC,
    SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, DIB_RGB_COLORS, ROP_CODE,
    SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DrawIconEx, GetCursorInfo, GetIconInfo, GetSystemMetrics, CURSORINFO, CURSOR_SHOWING,
    DI_NORMAL, ICONINFO, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
    SM_YVIRTUALSCREEN,
};

pub struct GdiGrabber;

impl GdiGrabber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GdiGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenGrabber for GdiGrabber {
    fn grab(&mut self) -> Result<Bitmap> {
        unsafe {
            let left = GetSystemMetrics(SM_XVIRTUALSCREEN);
            let top = GetSystemMetrics(SM_YVIRTUALSCREEN);
            let width = GetSystemMetrics(SM_CXVIRTUALSCREEN);
            let height = GetSystemMetrics(SM_CYVIRTUALSCREEN);
            if width <= 0 || height <= 0 {
                return Err(Error::Capture("virtual screen has no extent".into()));
            }

            let screen_dc = GetDC(Some(HWND::default()));
            if screen_dc.is_invalid() {
                return Err(Error::Capture("GetDC failed".into()));
            }
            let mem_dc = CreateCompatibleDC(Some(screen_dc));

            let mut info = BITMAPINFO::default();
            info.bmiHeader = BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: -height, // top-down rows
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            };

            let mut bits: *mut core::ffi::c_void = std::ptr::null_mut();
            let dib = match CreateDIBSection(
                Some(screen_dc),
                &info,
                DIB_RGB_COLORS,
                &mut bits,
                None,
                0,
            ) {
                Ok(dib) => dib,
                Err(e) => {
                    let _ = DeleteDC(mem_dc);
                    ReleaseDC(Some(HWND::default()), screen_dc);
                    return Err(Error::Capture(format!("CreateDIBSection failed: {e}")));
                }
            };

            let previous = SelectObject(mem_dc, dib.into());

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                Some(screen_dc),
                left,
                top,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            );

            if blit.is_ok() {
                draw_cursor(mem_dc, left, top);
            }

            let result = if blit.is_ok() {
                let len = width as usize * height as usize * 4;
                let pixels = std::slice::from_raw_parts(bits as *const u8, len);
                Ok(Bitmap {
                    width: width as u32,
                    height: height as u32,
                    bgra: pixels.to_vec(),
                })
            } else {
                Err(Error::Capture("BitBlt failed".into()))
            };

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(dib.into());
            let _ = DeleteDC(mem_dc);
            ReleaseDC(Some(HWND::default()), screen_dc);

            result
        }
    }
}

/// Composites the visible cursor at its screen position minus the hotspot.
unsafe fn draw_cursor(dc: windows::Win32::Graphics::Gdi::HDC, left: i32, top: i32) {
    let mut cursor = CURSORINFO {
        cbSize: std::mem::size_of::<CURSORINFO>() as u32,
        ..Default::default()
    };
    if GetCursorInfo(&mut cursor).is_err() || !cursor.flags.contains(CURSOR_SHOWING) {
        return;
    }
    let mut icon = ICONINFO::default();
    if GetIconInfo(cursor.hCursor, &mut icon).is_err() {
        return;
    }
    let x = cursor.ptScreenPos.x - left - icon.xHotspot as i32;
    let y = cursor.ptScreenPos.y - top - icon.yHotspot as i32;
    let _ = DrawIconEx(dc, x, y, cursor.hCursor, 0, 0, 0, None, DI_NORMAL);
    if !icon.hbmMask.is_invalid() {
        let _ = DeleteObject(icon.hbmMask.into());
    }
    if !icon.hbmColor.is_invalid() {
        let _ = DeleteObject(icon.hbmColor.into());
    }
}
