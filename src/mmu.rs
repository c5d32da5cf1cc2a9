use log::trace;

use super::apu::Apu;
use super::cartridge::Cartridge;
use super::interrupt::InterruptKind;
use super::joypad::Joypad;
use super::memory::Memory;
use super::ppu::Ppu;
use super::serial::Serial;
use super::timer::Timer;
use super::wram::Wram;

/// Progress of an in-flight OAM DMA transfer: the source high byte plus how
/// many of the 160 bytes have been copied so far. `None` means no transfer
/// is running.
#[derive(Clone, Copy)]
struct DmaProgress {
    source_high: u8,
    copied: u16,
}

/// Central address bus. Owns every memory-mapped peripheral and performs
/// the single address decode the rest of the machine relies on; the
/// cartridge is the only peripheral reached through a trait object, since
/// its concrete shape depends on the MBC selected at construction.
pub struct Mmu {
    cart: Box<dyn Cartridge>,
    apu: Apu,
    ppu: Ppu,
    wram: Wram,
    timer: Timer,
    joypad: Joypad,
    serial: Serial,
    hram: [u8; 0x7F],
    intf: u8,
    ie: u8,
    dma: Option<DmaProgress>,
    last_dma_trigger: u8,
    boot_rom: Option<Box<[u8]>>,
    boot_rom_mapped: bool,
}

/// T-cycles to copy all 160 OAM bytes (1 byte per M-cycle).
const DMA_TOTAL_CYCLES: u16 = 640;

impl Mmu {
    pub fn power_on(cart: Box<dyn Cartridge>, boot_rom: Option<Box<[u8]>>) -> Self {
        let boot_rom_mapped = boot_rom.is_some();
        Mmu {
            cart,
            apu: Apu::power_on(),
            ppu: Ppu::power_on(),
            wram: Wram::power_on(),
            timer: Timer::power_on(),
            joypad: Joypad::power_on(),
            serial: Serial::power_on(),
            hram: [0; 0x7F],
            intf: 0xE1,
            ie: 0x00,
            dma: None,
            last_dma_trigger: 0xFF,
            boot_rom,
            boot_rom_mapped,
        }
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn cart(&self) -> &dyn Cartridge {
        self.cart.as_ref()
    }

    pub fn cart_mut(&mut self) -> &mut dyn Cartridge {
        self.cart.as_mut()
    }

    pub fn joypad_mut(&mut self) -> &mut Joypad {
        &mut self.joypad
    }

    /// Whether any physical button is held, independent of which bank `FF00`
    /// has selected. STOP exits on this condition.
    pub fn joypad_line_active(&self) -> bool {
        self.joypad.any_pressed()
    }

    pub fn request_interrupt(&mut self, kind: InterruptKind) {
        self.intf |= kind as u8;
    }

    /// Advances every peripheral but the CPU by `cycles` T-cycles, in
    /// lock-step with the CPU step that produced them. Returns whether the
    /// PPU entered V-Blank (a frame boundary) during this step.
    pub fn step(&mut self, cycles: u32) -> bool {
        self.advance_dma(cycles);

        if let Some(kind) = self.timer.update(cycles) {
            self.request_interrupt(kind);
        }
        if let Some(kind) = self.serial.update(cycles) {
            self.request_interrupt(kind);
        }

        let mut frame_completed = false;
        for kind in self.ppu.update(cycles) {
            if kind == InterruptKind::VBlank {
                frame_completed = true;
            }
            self.request_interrupt(kind);
        }
        frame_completed
    }

    pub fn take_frame(&mut self, palette: &[[u8; 3]; 4]) -> Option<Box<[u8]>> {
        self.ppu.take_frame(palette)
    }

    pub(crate) fn lcd_enabled(&self) -> bool {
        self.ppu.lcd_enabled()
    }

    fn advance_dma(&mut self, cycles: u32) {
        let Some(mut progress) = self.dma else {
            return;
        };
        let remaining_bytes = 160u16.saturating_sub(progress.copied);
        let cycles_to_bytes = (cycles as u16) / 4;
        let bytes = cycles_to_bytes.min(remaining_bytes);
        for i in 0..bytes {
            let src = (progress.source_high as u16) << 8 | (progress.copied + i);
            let val = self.dma_source_read(src);
            self.ppu.write_byte(0xFE00 | (progress.copied + i), val);
        }
        progress.copied += bytes;
        if progress.copied >= 160 {
            self.dma = None;
        } else {
            self.dma = Some(progress);
        }
    }

    fn dma_source_read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.cart.read_byte(addr),
            0x8000..=0x9FFF => self.ppu.read_byte(addr),
            0xA000..=0xBFFF => self.cart.read_byte(addr),
            0xC000..=0xFDFF => self.wram.read_byte(addr),
            _ => 0xFF,
        }
    }

    fn dma_active(&self) -> bool {
        self.dma.is_some()
    }

    pub(crate) fn timer(&self) -> &Timer {
        &self.timer
    }

    pub(crate) fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub(crate) fn wram(&self) -> &Wram {
        &self.wram
    }

    pub(crate) fn wram_mut(&mut self) -> &mut Wram {
        &mut self.wram
    }

    pub(crate) fn hram_bytes(&self) -> &[u8] {
        &self.hram
    }

    pub(crate) fn hram_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.hram
    }

    pub(crate) fn interrupt_flags(&self) -> u8 {
        self.intf
    }

    pub(crate) fn interrupt_enable(&self) -> u8 {
        self.ie
    }

    pub(crate) fn set_interrupt_flags(&mut self, val: u8) {
        self.intf = val & 0x1F;
    }

    pub(crate) fn set_interrupt_enable(&mut self, val: u8) {
        self.ie = val;
    }

    /// `(source_high, copied)` of an in-flight OAM DMA transfer, or `None`.
    pub(crate) fn dma_progress(&self) -> Option<(u8, u16)> {
        self.dma.map(|p| (p.source_high, p.copied))
    }

    pub(crate) fn restore_dma_progress(&mut self, progress: Option<(u8, u16)>) {
        self.dma = progress.map(|(source_high, copied)| DmaProgress {
            source_high,
            copied,
        });
    }

    pub(crate) fn boot_rom_mapped(&self) -> bool {
        self.boot_rom_mapped
    }

    pub(crate) fn set_boot_rom_mapped(&mut self, mapped: bool) {
        self.boot_rom_mapped = mapped && self.boot_rom.is_some();
    }

    /// Snapshot of the addressable `FF00`-`FF7F` register window, bypassing
    /// the DMA-in-progress open-bus gate so a save taken mid-transfer still
    /// captures real register contents.
    pub(crate) fn io_register_snapshot(&self) -> [u8; 128] {
        let mut out = [0u8; 128];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read_io_register(0xFF00 + i as u16);
        }
        out
    }

    pub(crate) fn restore_io_registers(&mut self, data: &[u8]) {
        for (i, &val) in data.iter().take(128).enumerate() {
            self.write_io_register(0xFF00 + i as u16, val);
        }
    }

    fn read_io_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read_byte(addr),
            0xFF01..=0xFF02 => self.serial.read_byte(addr),
            0xFF04..=0xFF07 => self.timer.read_byte(addr),
            0xFF0F => 0xE0 | self.intf,
            0xFF10..=0xFF3F => self.apu.read_byte(addr),
            0xFF46 => self.last_dma_trigger,
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_byte(addr),
            _ => 0xFF,
        }
    }

    fn write_io_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write_byte(addr, val),
            0xFF01..=0xFF02 => self.serial.write_byte(addr, val),
            // FF04 restored via the timer's dedicated internal-counter
            // setter, which runs after this snapshot is applied; a blind
            // write here would reset the divider back to zero.
            0xFF05..=0xFF07 => self.timer.write_byte(addr, val),
            0xFF0F => self.intf = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_byte(addr, val),
            0xFF46 => self.last_dma_trigger = val,
            // FF44 (LY) is read-only; restored via the PPU's internal-state
            // setter instead.
            0xFF40..=0xFF43 | 0xFF45 | 0xFF47..=0xFF4B => self.ppu.write_byte(addr, val),
            _ => {}
        }
    }
}

impl Memory for Mmu {
    fn read_byte(&self, addr: u16) -> u8 {
        if self.dma_active() && !(0xFF80..=0xFFFE).contains(&addr) {
            return 0xFF;
        }

        if self.boot_rom_mapped && addr <= 0x00FF {
            if let Some(boot_rom) = &self.boot_rom {
                return boot_rom[addr as usize];
            }
        }

        match addr {
            0x0000..=0x7FFF => self.cart.read_byte(addr),
            0x8000..=0x9FFF => self.ppu.read_byte(addr),
            0xA000..=0xBFFF => self.cart.read_byte(addr),
            0xC000..=0xFDFF => self.wram.read_byte(addr),
            0xFE00..=0xFE9F => self.ppu.read_byte(addr),
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read_byte(addr),
            0xFF01..=0xFF02 => self.serial.read_byte(addr),
            0xFF04..=0xFF07 => self.timer.read_byte(addr),
            0xFF0F => 0xE0 | self.intf,
            0xFF10..=0xFF3F => self.apu.read_byte(addr),
            0xFF46 => self.last_dma_trigger,
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_byte(addr),
            0xFF4C..=0xFF4F | 0xFF51..=0xFF7F => 0xFF,
            0xFF50 => 0xFF,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie,
        }
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        if self.dma_active() && !(0xFF80..=0xFFFE).contains(&addr) {
            return;
        }

        match addr {
            0x0000..=0x7FFF => self.cart.write_byte(addr, val),
            0x8000..=0x9FFF => self.ppu.write_byte(addr, val),
            0xA000..=0xBFFF => self.cart.write_byte(addr, val),
            0xC000..=0xFDFF => self.wram.write_byte(addr, val),
            0xFE00..=0xFE9F => self.ppu.write_byte(addr, val),
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write_byte(addr, val),
            0xFF01..=0xFF02 => self.serial.write_byte(addr, val),
            0xFF04..=0xFF07 => self.timer.write_byte(addr, val),
            0xFF0F => self.intf = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_byte(addr, val),
            0xFF46 => {
                trace!("mmu: oam dma triggered, source high byte 0x{:02X}", val);
                self.last_dma_trigger = val;
                self.dma = Some(DmaProgress {
                    source_high: val,
                    copied: 0,
                });
            }
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.write_byte(addr, val),
            0xFF4C..=0xFF4F | 0xFF51..=0xFF7F => {}
            0xFF50 => {
                if val != 0 {
                    self.boot_rom_mapped = false;
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie = val,
        }
    }
}

#[cfg(test)]
mod mmu_tests {
    use super::*;
    use crate::cartridge;

    fn mmu_with_blank_rom() -> Mmu {
        let mut rom = vec![0u8; 0x8000];
        cartridge::patch_header_checksum(&mut rom);
        let cart = cartridge::from_rom(rom).unwrap();
        Mmu::power_on(cart, None)
    }

    #[test]
    fn echo_ram_mirrors_wram() {
        let mut mmu = mmu_with_blank_rom();
        mmu.write_byte(0xC100, 0x42);
        assert_eq!(mmu.read_byte(0xE100), 0x42);
    }

    #[test]
    fn prohibited_region_reads_as_open_bus() {
        let mmu = mmu_with_blank_rom();
        assert_eq!(mmu.read_byte(0xFEB0), 0xFF);
    }

    #[test]
    fn dma_start_blocks_non_hram_reads_for_its_duration() {
        let mut mmu = mmu_with_blank_rom();
        mmu.write_byte(0xFF46, 0xC0);
        assert_eq!(mmu.read_byte(0x0000), 0xFF);
        mmu.hram[0] = 0x7; // HRAM remains readable during DMA
        assert_eq!(mmu.read_byte(0xFF80), 0x7);

        mmu.step(DMA_TOTAL_CYCLES as u32);
        assert_ne!(mmu.read_byte(0x0000), 0xFF);
    }

    #[test]
    fn boot_rom_window_unmaps_on_ff50_write() {
        let mut rom = vec![0xAAu8; 0x8000];
        cartridge::patch_header_checksum(&mut rom);
        let cart = cartridge::from_rom(rom).unwrap();
        let boot_rom: Box<[u8]> = vec![0x11u8; 256].into_boxed_slice();
        let mut mmu = Mmu::power_on(cart, Some(boot_rom));

        assert_eq!(mmu.read_byte(0x0000), 0x11);
        mmu.write_byte(0xFF50, 0x01);
        assert_eq!(mmu.read_byte(0x0000), 0xAA);
    }
}
