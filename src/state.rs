use super::cartridge;
use super::config::Config;
use super::cpu::Cpu;
use super::error::Error;
use super::gb::Gameboy;
use super::mmu::Mmu;
use super::ppu::PpuState;

const MAGIC: [u8; 8] = *b"PBSTATE\0";
const VERSION: u16 = 1;

const TAG_CPU: u8 = 0x01;
const TAG_WRAM: u8 = 0x02;
const TAG_VRAM: u8 = 0x03;
const TAG_OAM: u8 = 0x04;
const TAG_HRAM: u8 = 0x05;
const TAG_IO_REGISTERS: u8 = 0x06;
const TAG_CARTRIDGE_RAM: u8 = 0x07;
const TAG_MBC_STATE: u8 = 0x08;
const TAG_PPU_INTERNAL: u8 = 0x09;
const TAG_TIMER_COUNTER: u8 = 0x0A;
const TAG_INTERRUPT_REGS: u8 = 0x0B;
const TAG_DMA_PROGRESS: u8 = 0x0C;
const TAG_BOOT_ROM_MAPPED: u8 = 0x0D;

fn write_block(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Serializes the full machine state: CPU registers and control flags,
/// every RAM region, the PPU and timer's hidden scheduling state, pending
/// interrupts, and the cartridge's battery RAM and bank-select registers.
/// Laid out as a versioned sequence of tagged, length-prefixed blocks, in
/// the manner of `boytacean`'s BESS blocks, so a future version can add a
/// block without breaking readers of an older one.
pub fn save(gb: &Gameboy) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());

    let cpu = gb.cpu().export_state();
    let mut cpu_bytes = Vec::with_capacity(14);
    cpu_bytes.extend_from_slice(&[
        cpu.a, cpu.f, cpu.b, cpu.c, cpu.d, cpu.e, cpu.h, cpu.l,
    ]);
    cpu_bytes.extend_from_slice(&cpu.sp.to_le_bytes());
    cpu_bytes.extend_from_slice(&cpu.pc.to_le_bytes());
    cpu_bytes.push(cpu.ime as u8);
    cpu_bytes.push(
        (cpu.halted as u8)
            | (cpu.stopped as u8) << 1
            | (cpu.halt_bug_pending as u8) << 2
            | (cpu.ime_armed_this_tick as u8) << 3
            | (cpu.ime_pending_apply as u8) << 4
            | (cpu.locked as u8) << 5,
    );
    write_block(&mut out, TAG_CPU, &cpu_bytes);

    let mmu = gb.mmu();
    write_block(&mut out, TAG_WRAM, mmu.wram().bytes());
    write_block(&mut out, TAG_VRAM, mmu.ppu().vram_bytes());
    write_block(&mut out, TAG_OAM, mmu.ppu().oam_bytes());
    write_block(&mut out, TAG_HRAM, mmu.hram_bytes());
    write_block(&mut out, TAG_IO_REGISTERS, &mmu.io_register_snapshot());

    if let Some(ram) = mmu.cart().save_ram() {
        write_block(&mut out, TAG_CARTRIDGE_RAM, &ram);
    }
    write_block(&mut out, TAG_MBC_STATE, &mmu.cart().export_mbc_state());

    let ppu_state = mmu.ppu().export_internal_state();
    let dot_bytes = ppu_state.dot.to_le_bytes();
    let ppu_bytes = [
        ppu_state.mode,
        dot_bytes[0],
        dot_bytes[1],
        ppu_state.window_line,
        ppu_state.ly,
        ppu_state.first_frame_after_enable as u8,
    ];
    write_block(&mut out, TAG_PPU_INTERNAL, &ppu_bytes);

    write_block(
        &mut out,
        TAG_TIMER_COUNTER,
        &mmu.timer().internal_counter().to_le_bytes(),
    );
    write_block(
        &mut out,
        TAG_INTERRUPT_REGS,
        &[mmu.interrupt_enable(), mmu.interrupt_flags()],
    );

    let (source_high, copied) = mmu.dma_progress().unwrap_or((0, 0xFFFF));
    let mut dma_bytes = Vec::with_capacity(3);
    dma_bytes.push(source_high);
    dma_bytes.extend_from_slice(&copied.to_le_bytes());
    write_block(&mut out, TAG_DMA_PROGRESS, &dma_bytes);

    write_block(&mut out, TAG_BOOT_ROM_MAPPED, &[mmu.boot_rom_mapped() as u8]);

    out
}

/// Rebuilds a `Gameboy` from a buffer written by `save`. `config` supplies
/// the cartridge the state applies to and the palette/boot-ROM settings
/// the original `Gameboy::power_on` used; the state buffer only carries
/// what changes as the machine runs.
pub fn load(data: &[u8], config: &Config, rom: Vec<u8>) -> Result<Gameboy, Error> {
    if data.len() < MAGIC.len() + 2 || data[..MAGIC.len()] != MAGIC[..] {
        return Err(Error::IncompatibleStateVersion);
    }
    let mut offset = MAGIC.len();
    let version = u16::from_le_bytes([data[offset], data[offset + 1]]);
    if version != VERSION {
        return Err(Error::IncompatibleStateVersion);
    }
    offset += 2;

    let cart = cartridge::from_rom(rom)?;
    let mut gb = Gameboy::power_on(config.clone(), cart);

    while offset < data.len() {
        if offset + 5 > data.len() {
            return Err(Error::TruncatedState);
        }
        let tag = data[offset];
        let len = u32::from_le_bytes([
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
            data[offset + 4],
        ]) as usize;
        offset += 5;
        if offset + len > data.len() {
            return Err(Error::TruncatedState);
        }
        let payload = &data[offset..offset + len];
        offset += len;

        apply_block(&mut gb, tag, payload)?;
    }

    Ok(gb)
}

fn apply_block(gb: &mut Gameboy, tag: u8, payload: &[u8]) -> Result<(), Error> {
    match tag {
        TAG_CPU => {
            if payload.len() < 14 {
                return Err(Error::TruncatedState);
            }
            let flags = payload[13];
            let state = super::cpu::CpuState {
                a: payload[0],
                f: payload[1],
                b: payload[2],
                c: payload[3],
                d: payload[4],
                e: payload[5],
                h: payload[6],
                l: payload[7],
                sp: u16::from_le_bytes([payload[8], payload[9]]),
                pc: u16::from_le_bytes([payload[10], payload[11]]),
                ime: payload[12] != 0,
                halted: flags & 0x01 != 0,
                stopped: flags & 0x02 != 0,
                halt_bug_pending: flags & 0x04 != 0,
                ime_armed_this_tick: flags & 0x08 != 0,
                ime_pending_apply: flags & 0x10 != 0,
                locked: flags & 0x20 != 0,
            };
            *gb.cpu_mut() = Cpu::import_state(state);
        }
        TAG_WRAM => copy_exact(gb.mmu_mut().wram_mut().bytes_mut(), payload)?,
        TAG_VRAM => copy_exact(gb.mmu_mut().ppu_mut().vram_bytes_mut(), payload)?,
        TAG_OAM => copy_exact(gb.mmu_mut().ppu_mut().oam_bytes_mut(), payload)?,
        TAG_HRAM => copy_exact(gb.mmu_mut().hram_bytes_mut(), payload)?,
        TAG_IO_REGISTERS => gb.mmu_mut().restore_io_registers(payload),
        TAG_CARTRIDGE_RAM => gb.mmu_mut().cart_mut().load_save_ram(payload),
        TAG_MBC_STATE => gb.mmu_mut().cart_mut().import_mbc_state(payload),
        TAG_PPU_INTERNAL => {
            if payload.len() < 6 {
                return Err(Error::TruncatedState);
            }
            gb.mmu_mut().ppu_mut().import_internal_state(PpuState {
                mode: payload[0],
                dot: u16::from_le_bytes([payload[1], payload[2]]),
                window_line: payload[3],
                ly: payload[4],
                first_frame_after_enable: payload[5] != 0,
            });
        }
        TAG_TIMER_COUNTER => {
            if payload.len() < 2 {
                return Err(Error::TruncatedState);
            }
            gb.mmu_mut()
                .timer_mut()
                .restore_internal_counter(u16::from_le_bytes([payload[0], payload[1]]));
        }
        TAG_INTERRUPT_REGS => {
            if payload.len() < 2 {
                return Err(Error::TruncatedState);
            }
            gb.mmu_mut().set_interrupt_enable(payload[0]);
            gb.mmu_mut().set_interrupt_flags(payload[1]);
        }
        TAG_DMA_PROGRESS => {
            if payload.len() < 3 {
                return Err(Error::TruncatedState);
            }
            let copied = u16::from_le_bytes([payload[1], payload[2]]);
            let progress = if copied >= 160 {
                None
            } else {
                Some((payload[0], copied))
            };
            gb.mmu_mut().restore_dma_progress(progress);
        }
        TAG_BOOT_ROM_MAPPED => {
            if let Some(&mapped) = payload.first() {
                gb.mmu_mut().set_boot_rom_mapped(mapped != 0);
            }
        }
        _ => {}
    }
    Ok(())
}

fn copy_exact(dst: &mut [u8], src: &[u8]) -> Result<(), Error> {
    if src.len() != dst.len() {
        return Err(Error::TruncatedState);
    }
    dst.copy_from_slice(src);
    Ok(())
}
