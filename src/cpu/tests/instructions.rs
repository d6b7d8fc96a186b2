//! Architectural behaviour of the documented (and load-bearing
//! undocumented) instructions.

use super::*;

#[test]
fn inc_a_from_zero() {
    let (mut cpu, mut bus) = setup(&[0x3C]); // INC A
    cpu.a = 0x00;
    cpu.f = C_FLAG; // carry must survive INC
    run(&mut cpu, &mut bus, 1);

    assert_eq!(cpu.a, 0x01);
    assert_eq!(cpu.pc, 0x0001);
    assert!(!cpu.flag(S_FLAG));
    assert!(!cpu.flag(Z_FLAG));
    assert!(!cpu.flag(H_FLAG));
    assert!(!cpu.flag(P_FLAG));
    assert!(!cpu.flag(N_FLAG));
    assert!(cpu.flag(C_FLAG));
    assert_eq!(bus.clock, 4);
}

#[test]
fn inc_a_half_carry() {
    let (mut cpu, mut bus) = setup(&[0x3C]);
    cpu.a = 0x0F;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.a, 0x10);
    assert!(cpu.flag(H_FLAG));
    assert!(!cpu.flag(Z_FLAG));
    assert!(!cpu.flag(S_FLAG));
}

#[test]
fn daa_bcd_carry_out() {
    let (mut cpu, mut bus) = setup(&[0x27]); // DAA
    cpu.a = 0x9A;
    cpu.f = 0;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.a, 0x00);
    assert!(cpu.flag(Z_FLAG));
    assert!(cpu.flag(C_FLAG));
}

#[test]
fn push_pop_round_trips_every_pair() {
    // PUSH BC/DE/HL/AF; POP into the opposite order of pairs and back.
    let (mut cpu, mut bus) = setup(&[0xC5, 0xC1, 0xD5, 0xD1, 0xE5, 0xE1, 0xF5, 0xF1]);
    cpu.sp = 0x8000;
    cpu.set_bc(0x1234);
    cpu.set_de(0x5678);
    cpu.set_hl(0x9ABC);
    cpu.set_af(0xDE00 | 0x41);
    let (bc, de, hl, af) = (cpu.bc(), cpu.de(), cpu.hl(), cpu.af());
    run(&mut cpu, &mut bus, 8);
    assert_eq!(cpu.bc(), bc);
    assert_eq!(cpu.de(), de);
    assert_eq!(cpu.hl(), hl);
    assert_eq!(cpu.af(), af);
    assert_eq!(cpu.sp, 0x8000);
}

#[test]
fn ex_de_hl_is_self_inverse() {
    let (mut cpu, mut bus) = setup(&[0xEB, 0xEB]);
    cpu.set_de(0x1111);
    cpu.set_hl(0x2222);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.de(), 0x2222);
    assert_eq!(cpu.hl(), 0x1111);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.de(), 0x1111);
    assert_eq!(cpu.hl(), 0x2222);
}

#[test]
fn exx_swaps_the_shadow_set() {
    let (mut cpu, mut bus) = setup(&[0xD9, 0xD9]);
    cpu.set_bc(0x0101);
    cpu.set_de(0x0202);
    cpu.set_hl(0x0303);
    cpu.bc_alt = 0x1111;
    cpu.de_alt = 0x2222;
    cpu.hl_alt = 0x3333;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.bc(), 0x1111);
    assert_eq!(cpu.hl(), 0x3333);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.bc(), 0x0101);
    assert_eq!(cpu.de(), 0x0202);
}

#[test]
fn ld_r_r_matrix() {
    // LD B,C ; LD D,B ; LD A,D
    let (mut cpu, mut bus) = setup(&[0x41, 0x50, 0x7A]);
    cpu.c = 0x5A;
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.b, 0x5A);
    assert_eq!(cpu.d, 0x5A);
    assert_eq!(cpu.a, 0x5A);
}

#[test]
fn hl_indirect_loads_and_stores() {
    // LD (HL),A ; LD B,(HL)
    let (mut cpu, mut bus) = setup(&[0x77, 0x46]);
    cpu.set_hl(0x4000);
    cpu.a = 0x99;
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.mem[0x4000], 0x99);
    assert_eq!(cpu.b, 0x99);
}

#[test]
fn jumps_and_calls() {
    let (mut cpu, mut bus) = setup(&[0xC3, 0x10, 0x00]); // JP 0x0010
    bus.load(0x0010, &[0xCD, 0x20, 0x00]); // CALL 0x0020
    bus.load(0x0020, &[0xC9]); // RET
    cpu.sp = 0x8000;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.pc, 0x0010);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.pc, 0x0020);
    assert_eq!(cpu.sp, 0x7FFE);
    assert_eq!(bus.mem[0x7FFE], 0x13); // return address low byte
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.pc, 0x0013);
    assert_eq!(cpu.sp, 0x8000);
}

#[test]
fn conditional_jr_both_ways() {
    // JR NZ,+2 with Z set: falls through to the next instruction.
    let (mut cpu, mut bus) = setup(&[0x20, 0x02, 0x00, 0x00]);
    cpu.f = Z_FLAG;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.pc, 0x0002);
    assert_eq!(bus.clock, 7);

    // taken this time
    let (mut cpu, mut bus) = setup(&[0x20, 0x02, 0x00, 0x00]);
    cpu.f = 0;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.pc, 0x0004);
    assert_eq!(bus.clock, 12);
}

#[test]
fn djnz_loops_b_times() {
    // LD B,3 ; DJNZ -2 (spins on itself) ; NOP
    let (mut cpu, mut bus) = setup(&[0x06, 0x03, 0x10, 0xFE, 0x00]);
    run(&mut cpu, &mut bus, 1);
    run(&mut cpu, &mut bus, 3); // three DJNZ executions
    assert_eq!(cpu.b, 0);
    assert_eq!(cpu.pc, 0x0004);
}

#[test]
fn rst_pushes_and_vectors() {
    let (mut cpu, mut bus) = setup(&[0xEF]); // RST 28H
    cpu.sp = 0x8000;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.pc, 0x0028);
    assert_eq!(cpu.sp, 0x7FFE);
    assert_eq!(bus.mem[0x7FFE], 0x01);
    assert_eq!(bus.mem[0x7FFF], 0x00);
}

#[test]
fn io_instructions_reach_the_ports() {
    let (mut cpu, mut bus) = setup(&[0xDB, 0x12, 0xD3, 0x34]); // IN A,(12) ; OUT (34),A
    bus.io_in[0x12] = 0xAB;
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.a, 0xAB);
    assert_eq!(bus.io_out, vec![(0x34, 0xAB)]);
}

#[test]
fn cb_rotates_and_bits() {
    // RLC B ; BIT 7,B ; RES 7,B ; SET 0,B
    let (mut cpu, mut bus) = setup(&[0xCB, 0x00, 0xCB, 0x78, 0xCB, 0xB8, 0xCB, 0xC0]);
    cpu.b = 0x81;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.b, 0x03);
    assert!(cpu.flag(C_FLAG));
    run(&mut cpu, &mut bus, 1);
    assert!(cpu.flag(Z_FLAG)); // bit 7 clear
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.b, 0x03); // RES 7 no-op here, SET 0 already set
}

#[test]
fn undocumented_sll_shifts_in_a_one() {
    let (mut cpu, mut bus) = setup(&[0xCB, 0x30]); // SLL B
    cpu.b = 0x40;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.b, 0x81);
    assert!(!cpu.flag(C_FLAG));
    assert!(cpu.flag(S_FLAG));
}

#[test]
fn index_prefix_rewrites_hl_operands() {
    // LD IX,0x4000 ; LD (IX+5),0x77 ; LD A,(IX+5)
    let (mut cpu, mut bus) = setup(&[
        0xDD, 0x21, 0x00, 0x40, // LD IX,0x4000
        0xDD, 0x36, 0x05, 0x77, // LD (IX+5),n
        0xDD, 0x7E, 0x05, // LD A,(IX+5)
    ]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.ix, 0x4000);
    assert_eq!(bus.mem[0x4005], 0x77);
    assert_eq!(cpu.a, 0x77);
}

#[test]
fn index_halves_are_addressable() {
    // LD IXh,0x12 via LD H under DD ; LD IXl,0x34 ; ADD IX,IX
    let (mut cpu, mut bus) = setup(&[
        0xDD, 0x26, 0x12, // LD IXh,0x12
        0xDD, 0x2E, 0x34, // LD IXl,0x34
        0xDD, 0x29, // ADD IX,IX
    ]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.ix, 0x1234);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.ix, 0x2468);
}

#[test]
fn negative_displacement_works() {
    let (mut cpu, mut bus) = setup(&[
        0xFD, 0x21, 0x00, 0x40, // LD IY,0x4000
        0xFD, 0x7E, 0xFE, // LD A,(IY-2)
    ]);
    bus.mem[0x3FFE] = 0x5C;
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.a, 0x5C);
}

#[test]
fn ddcb_writes_back_to_register() {
    // DD CB 05 06: RLC (IX+5), plain form, result only in memory
    // DD CB 05 00: RLC (IX+5),B quirk form, result also lands in B
    let (mut cpu, mut bus) = setup(&[
        0xDD, 0x21, 0x00, 0x40, // LD IX,0x4000
        0xDD, 0xCB, 0x05, 0x06, // RLC (IX+5)
        0xDD, 0xCB, 0x05, 0x00, // RLC (IX+5) → B
    ]);
    bus.mem[0x4005] = 0x81;
    cpu.b = 0x00;
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.mem[0x4005], 0x03);
    assert_eq!(cpu.b, 0x00);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.mem[0x4005], 0x06);
    assert_eq!(cpu.b, 0x06);
}

#[test]
fn ddcb_set_res_quirk_and_bit() {
    let (mut cpu, mut bus) = setup(&[
        0xDD, 0x21, 0x00, 0x40, // LD IX,0x4000
        0xDD, 0xCB, 0x00, 0xC7, // SET 0,(IX+0) → A
        0xDD, 0xCB, 0x00, 0x46, // BIT 0,(IX+0)
    ]);
    bus.mem[0x4000] = 0x00;
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.mem[0x4000], 0x01);
    assert_eq!(cpu.a, 0x01);
    run(&mut cpu, &mut bus, 1);
    assert!(!cpu.flag(Z_FLAG));
}

#[test]
fn adc_sbc_hl_set_full_flags() {
    // SBC HL,BC with HL == BC and carry clear → zero
    let (mut cpu, mut bus) = setup(&[0xED, 0x42, 0xED, 0x4A]);
    cpu.set_hl(0x1234);
    cpu.set_bc(0x1234);
    cpu.f = 0;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.hl(), 0);
    assert!(cpu.flag(Z_FLAG));
    assert!(cpu.flag(N_FLAG));
    // ADC HL,BC → 0x1234 again
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.hl(), 0x1234);
    assert!(!cpu.flag(Z_FLAG));
    assert!(!cpu.flag(N_FLAG));
}

#[test]
fn neg_subtracts_from_zero() {
    let (mut cpu, mut bus) = setup(&[0xED, 0x44]);
    cpu.a = 0x01;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.a, 0xFF);
    assert!(cpu.flag(C_FLAG));
    assert!(cpu.flag(N_FLAG));
}

#[test]
fn ldir_copies_and_counts_down() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB0]);
    cpu.set_hl(0x4000);
    cpu.set_de(0x5000);
    cpu.set_bc(4);
    bus.load(0x4000, &[1, 2, 3, 4]);
    // LDIR re-executes itself until BC runs out.
    for _ in 0..4 {
        run(&mut cpu, &mut bus, 1);
    }
    assert_eq!(&bus.mem[0x5000..0x5004], &[1, 2, 3, 4]);
    assert_eq!(cpu.bc(), 0);
    assert_eq!(cpu.pc, 0x0002);
    assert!(!cpu.flag(P_FLAG));
}

#[test]
fn cpir_stops_on_match() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB1]);
    cpu.set_hl(0x4000);
    cpu.set_bc(10);
    cpu.a = 0x33;
    bus.load(0x4000, &[0x11, 0x22, 0x33, 0x44]);
    for _ in 0..3 {
        run(&mut cpu, &mut bus, 1);
    }
    assert!(cpu.flag(Z_FLAG));
    assert_eq!(cpu.hl(), 0x4003);
    assert_eq!(cpu.bc(), 7);
    assert_eq!(cpu.pc, 0x0002);
}

#[test]
fn rld_rrd_shuffle_nibbles() {
    let (mut cpu, mut bus) = setup(&[0xED, 0x6F, 0xED, 0x67]); // RLD ; RRD
    cpu.set_hl(0x4000);
    cpu.a = 0x12;
    bus.mem[0x4000] = 0x34;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.a, 0x13);
    assert_eq!(bus.mem[0x4000], 0x42);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.a, 0x12);
    assert_eq!(bus.mem[0x4000], 0x34);
}

#[test]
fn ld_a_i_copies_iff2_to_parity() {
    let (mut cpu, mut bus) = setup(&[0xED, 0x57, 0xED, 0x57]);
    cpu.i = 0x80;
    cpu.iff2 = true;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.a, 0x80);
    assert!(cpu.flag(P_FLAG));
    assert!(cpu.flag(S_FLAG));
    cpu.iff2 = false;
    run(&mut cpu, &mut bus, 1);
    assert!(!cpu.flag(P_FLAG));
}

#[test]
fn scf_ccf_carry_dance() {
    let (mut cpu, mut bus) = setup(&[0x37, 0x3F]); // SCF ; CCF
    run(&mut cpu, &mut bus, 1);
    assert!(cpu.flag(C_FLAG));
    run(&mut cpu, &mut bus, 1);
    assert!(!cpu.flag(C_FLAG));
    assert!(cpu.flag(H_FLAG)); // CCF moves old carry into H
}

#[test]
fn halt_spins_until_released() {
    let (mut cpu, mut bus) = setup(&[0x76]);
    run(&mut cpu, &mut bus, 1);
    assert!(cpu.halted());
    let pc = cpu.pc;
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.pc, pc); // burning NOP time, not advancing
}
